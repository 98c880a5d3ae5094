use chain::{ChainError, Kwargs, Outcome, RemoteTarget, Value};

/// A small stand-in root object for the demo: a mutable counter with a
/// "superclass view" that halves `x` differently, mirroring the
/// attribute-round-trip and `super` scenarios the proxy protocol is meant
/// to carry.
pub struct Counter {
    x: i64,
}

impl Counter {
    pub fn new(x: i64) -> Self {
        Self { x }
    }
}

#[async_trait::async_trait]
impl RemoteTarget for Counter {
    async fn get_attr(&self, depth: u32, name: &str) -> Result<Value, ChainError> {
        match (depth, name) {
            (0, "x") => Ok(Value::from(self.x)),
            (1, "x") => Ok(Value::from(self.x * 2)),
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
            Some("error") => Err(ChainError::Failed("error!".into())),
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
}
