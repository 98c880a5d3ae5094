//! The deferred-operation chain: the unit of work a [`Proxy`](../proxy/struct.Proxy.html)
//! ships to a listener and applies against the object it owns.
//!
//! A [`Chain`] is an ordered list of [`Step`]s. Executing it walks a [`Cursor`]
//! through the steps, starting bound to the root target and ending either back
//! at the root (a self-return, see [`Outcome::SelfRef`]) or at a resolved
//! [`Value`].

mod error;
mod step;
mod target;
mod value;

pub use error::ChainError;
pub use step::{Step, Chain};
pub use target::{Outcome, RemoteTarget};
pub use value::{json_get_attr, json_get_item, json_set_item, Kwargs, Value};

/// Where execution currently stands relative to the root target.
///
/// `Root`/`SuperRoot` mean later steps still dispatch through
/// [`RemoteTarget`] method calls; `PendingAttr` defers a `GetAttr` until we
/// know whether it is a plain read or the prefix of a method call; `Value`
/// means we have fallen off the root onto a plain, immutable snapshot.
#[derive(Debug, Clone)]
pub enum Cursor {
    /// Dispatching against the root target. The depth is the number of
    /// consecutive `Super` steps applied so far (0 = the target itself).
    Root(u32),
    /// A `GetAttr(name)` was applied to the root (at `depth`) and has not
    /// yet been resolved into either a plain read or a call.
    PendingAttr(String, u32),
    /// Execution has fallen off the root target onto an ordinary value;
    /// further `GetAttr`/`GetItem` steps index into it structurally, and
    /// mutation/`Call` steps are no longer meaningful.
    Value(Value),
}

/// Execute `chain` against `target`, returning the final [`Outcome`].
///
/// This is the sole execution entry point used by both the listener (which
/// applies full caller-submitted chains) and the proxy's "immediate"
/// operations (attribute/item writes), which build one-step chains.
pub async fn execute<T>(chain: &Chain, target: &mut T) -> Result<Outcome, ChainError>
where
    T: RemoteTarget + ?Sized,
{
    let mut cursor = Cursor::Root(0);
    for step in chain.steps() {
        cursor = apply_step(step, cursor, target).await?;
    }
    resolve(cursor, target).await
}

async fn resolve<T>(cursor: Cursor, target: &mut T) -> Result<Outcome, ChainError>
where
    T: RemoteTarget + ?Sized,
{
    match cursor {
        Cursor::Root(_) => Ok(Outcome::SelfRef),
        Cursor::PendingAttr(name, depth) => {
            Ok(Outcome::Value(target.get_attr(depth, &name).await?))
        }
        Cursor::Value(v) => Ok(Outcome::Value(v)),
    }
}

async fn apply_step<T>(step: &Step, cursor: Cursor, target: &mut T) -> Result<Cursor, ChainError>
where
    T: RemoteTarget + ?Sized,
{
    match (step, cursor) {
        (Step::Super, Cursor::Root(depth)) => {
            if depth + 1 > target.max_super_depth() {
                return Err(ChainError::SuperDepthExceeded(depth + 1));
            }
            Ok(Cursor::Root(depth + 1))
        }
        (Step::Super, Cursor::PendingAttr(..) | Cursor::Value(_)) => {
            Err(ChainError::SuperNotAtRoot)
        }

        (Step::GetAttr(name), Cursor::Root(depth)) => {
            Ok(Cursor::PendingAttr(name.clone(), depth))
        }
        (Step::GetAttr(name), Cursor::PendingAttr(prev, depth)) => {
            let v = target.get_attr(depth, &prev).await?;
            Ok(Cursor::Value(json_get_attr(&v, name)?))
        }
        (Step::GetAttr(name), Cursor::Value(v)) => Ok(Cursor::Value(json_get_attr(&v, name)?)),

        (Step::Call(args, kwargs), Cursor::PendingAttr(name, depth)) => {
            match target.call(depth, Some(&name), args.clone(), kwargs.clone()).await? {
                Outcome::SelfRef => Ok(Cursor::Root(0)),
                Outcome::Value(v) => Ok(Cursor::Value(v)),
            }
        }
        (Step::Call(args, kwargs), Cursor::Root(depth)) => {
            match target.call(depth, None, args.clone(), kwargs.clone()).await? {
                Outcome::SelfRef => Ok(Cursor::Root(0)),
                Outcome::Value(v) => Ok(Cursor::Value(v)),
            }
        }
        (Step::Call(..), Cursor::Value(_)) => Err(ChainError::NotCallable),

        (Step::GetItem(key), Cursor::PendingAttr(name, depth)) => {
            let v = target.get_attr(depth, &name).await?;
            Ok(Cursor::Value(json_get_item(&v, key)?))
        }
        (Step::GetItem(key), Cursor::Root(depth)) => {
            Ok(Cursor::Value(target.get_item(depth, key.clone()).await?))
        }
        (Step::GetItem(key), Cursor::Value(v)) => Ok(Cursor::Value(json_get_item(&v, key)?)),

        (Step::SetAttr(name, value), Cursor::Root(depth)) => {
            target.set_attr(depth, name, value.clone()).await?;
            Ok(Cursor::Value(Value::Null))
        }
        (Step::DelAttr(name), Cursor::Root(depth)) => {
            target.del_attr(depth, name).await?;
            Ok(Cursor::Value(Value::Null))
        }
        (Step::SetItem(key, value), Cursor::Root(depth)) => {
            target.set_item(depth, key.clone(), value.clone()).await?;
            Ok(Cursor::Value(Value::Null))
        }
        (Step::DelItem(key), Cursor::Root(depth)) => {
            target.del_item(depth, key.clone()).await?;
            Ok(Cursor::Value(Value::Null))
        }
        (Step::SetAttr(..) | Step::DelAttr(..) | Step::SetItem(..) | Step::DelItem(..), _) => {
            Err(ChainError::ImmutableValue)
        }

        (Step::PassTo(name, extra_args, extra_kwargs), cursor) => {
            let current = match cursor {
                Cursor::Root(depth) => target.as_value(depth),
                Cursor::PendingAttr(attr, depth) => target.get_attr(depth, &attr).await?,
                Cursor::Value(v) => v,
            };
            let result = target.passto(name, current, extra_args.clone(), extra_kwargs.clone())?;
            Ok(Cursor::Value(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// A minimal in-memory target used to exercise the execution model
    /// without any process/thread machinery; mirrors the `ObjectA`/`ObjectB`
    /// fixtures used to validate chaining, `super`, and self-return.
    struct Counter {
        x: i64,
        registry: HashMap<String, i64>,
    }

    #[async_trait::async_trait]
    impl RemoteTarget for Counter {
        async fn get_attr(&self, depth: u32, name: &str) -> Result<Value, ChainError> {
            match (depth, name) {
                (0, "x") => Ok(Value::from(self.x)),
                (0, "half") => Ok(Value::from(self.x as f64 / 2.0)),
                (1, "half") => Ok(Value::from(self.x as f64 / 4.0)), // superclass view halves differently
                _ => Err(ChainError::NoSuchAttr(name.to_string())),
            }
        }
        async fn set_attr(&mut self, _depth: u32, name: &str, value: Value) -> Result<(), ChainError> {
            if name == "x" {
                self.x = value.as_i64().ok_or(ChainError::TypeMismatch)?;
                Ok(())
            } else {
                Err(ChainError::NoSuchAttr(name.to_string()))
            }
        }
        async fn del_attr(&mut self, _depth: u32, name: &str) -> Result<(), ChainError> {
            Err(ChainError::NoSuchAttr(name.to_string()))
        }
        async fn call(
            &mut self,
            _depth: u32,
            member: Option<&str>,
            _args: Vec<Value>,
            _kwargs: Kwargs,
        ) -> Result<Outcome, ChainError> {
            match member {
                Some("double") => {
                    self.x *= 2;
                    Ok(Outcome::SelfRef)
                }
                Some("inc") => {
                    self.x += 1;
                    Ok(Outcome::Value(Value::from(self.x)))
                }
                Some("error") => Err(ChainError::Failed("boom".into())),
                _ => Err(ChainError::NoSuchAttr(member.unwrap_or("").to_string())),
            }
        }
        async fn get_item(&self, _depth: u32, _key: Value) -> Result<Value, ChainError> {
            Err(ChainError::NotIndexable)
        }
        async fn set_item(&mut self, _depth: u32, _key: Value, _value: Value) -> Result<(), ChainError> {
            Err(ChainError::NotIndexable)
        }
        async fn del_item(&mut self, _depth: u32, _key: Value) -> Result<(), ChainError> {
            Err(ChainError::NotIndexable)
        }
        fn as_value(&self, _depth: u32) -> Value {
            Value::from(format!("<Counter x={}>", self.x))
        }
        fn max_super_depth(&self) -> u32 {
            1
        }
        fn passto(
            &self,
            name: &str,
            current: Value,
            _extra_args: Vec<Value>,
            _extra_kwargs: Kwargs,
        ) -> Result<Value, ChainError> {
            let offset = self.registry.get(name).ok_or_else(|| ChainError::UnknownPassTo(name.to_string()))?;
            let base = current.as_i64().ok_or(ChainError::TypeMismatch)?;
            Ok(Value::from(base + offset))
        }
    }

    #[tokio::test]
    async fn attribute_round_trip() {
        let mut c = Counter { x: 10, registry: HashMap::new() };
        let chain = Chain::new(vec![Step::GetAttr("x".into())]);
        assert!(matches!(execute(&chain, &mut c).await.unwrap(), Outcome::Value(v) if v.as_i64() == Some(10)));
    }

    #[tokio::test]
    async fn self_chaining() {
        let mut c = Counter { x: 10, registry: HashMap::new() };
        let chain = Chain::new(vec![
            Step::GetAttr("double".into()),
            Step::Call(vec![], Kwargs::new()),
            Step::GetAttr("double".into()),
            Step::Call(vec![], Kwargs::new()),
            Step::GetAttr("double".into()),
            Step::Call(vec![], Kwargs::new()),
        ]);
        assert!(matches!(execute(&chain, &mut c).await.unwrap(), Outcome::SelfRef));
        assert_eq!(c.x, 80);
    }

    #[tokio::test]
    async fn super_view() {
        let mut c = Counter { x: 20, registry: HashMap::new() };
        let chain = Chain::new(vec![Step::Super, Step::GetAttr("half".into())]);
        let Outcome::Value(v) = execute(&chain, &mut c).await.unwrap() else {
            panic!("expected a value")
        };
        assert_eq!(v.as_f64(), Some(5.0));
    }

    #[tokio::test]
    async fn remote_error_propagates() {
        let mut c = Counter { x: 0, registry: HashMap::new() };
        let chain = Chain::new(vec![Step::GetAttr("error".into()), Step::Call(vec![], Kwargs::new())]);
        let err = execute(&chain, &mut c).await.unwrap_err();
        assert!(matches!(err, ChainError::Failed(msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn set_then_get_reflects_the_mutation() {
        let mut c = Counter { x: 1, registry: HashMap::new() };
        let chain = Chain::new(vec![Step::SetAttr("x".into(), Value::from(42))]);
        execute(&chain, &mut c).await.unwrap();
        assert_eq!(c.x, 42);
    }

    #[tokio::test]
    async fn passto_applies_a_registered_callable() {
        let mut registry = HashMap::new();
        registry.insert("add_ten".to_string(), 10);
        let mut c = Counter { x: 5, registry };
        let chain = Chain::new(vec![Step::PassTo("add_ten".into(), vec![], Kwargs::new())]);
        let Outcome::Value(v) = execute(&chain, &mut c).await.unwrap() else {
            panic!("expected a value")
        };
        assert_eq!(v.as_i64(), Some(15));
    }

    #[tokio::test]
    async fn passto_rejects_an_unregistered_name() {
        let mut c = Counter { x: 5, registry: HashMap::new() };
        let chain = Chain::new(vec![Step::PassTo("missing".into(), vec![], Kwargs::new())]);
        let err = execute(&chain, &mut c).await.unwrap_err();
        assert!(matches!(err, ChainError::UnknownPassTo(name) if name == "missing"));
    }
}
