//! Scoped exception capture: group errors raised inside a `scope()` by
//! name instead of letting them unwind, and carry whatever a wrapped
//! function returned (a value, or a sequence of yielded values) alongside
//! them. [`Except`] extends the same bookkeeping across a channel so a
//! supervisor can observe both from outside the worker that produced them.

mod capture;
mod local;
mod remote;

pub use capture::{RemoteException, RemoteTraceback};
pub use local::{LocalExcept, ResultView, ScopeConfig};
pub use remote::{channel, ChannelMessage, Except};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fmt;
    use std::time::Duration;

    #[derive(Debug)]
    struct Boom(String);

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn default_scope_swallows_and_records() {
        let catch: LocalExcept<()> = LocalExcept::default();
        let result = catch.scope().run(|| -> Result<i32, Boom> { Err(Boom("no".into())) });
        assert_eq!(result.unwrap(), None);
        assert_eq!(catch.last().unwrap().message(), "no");
    }

    #[test]
    fn raises_true_still_records_but_propagates() {
        let catch: LocalExcept<()> = LocalExcept::default();
        let result = catch.scope().raises(true).run(|| -> Result<i32, Boom> { Err(Boom("no".into())) });
        assert!(result.is_err());
        assert_eq!(catch.last().unwrap().message(), "no");
    }

    #[test]
    fn catch_once_false_forces_raises() {
        let catch: LocalExcept<()> = LocalExcept::default();
        let result = catch.scope().catch_once(false).run(|| -> Result<i32, Boom> { Err(Boom("no".into())) });
        assert!(result.is_err());
    }

    #[test]
    fn named_scopes_group_independently() {
        let catch: LocalExcept<()> = LocalExcept::default();
        catch.scope().name("a").run(|| -> Result<(), Boom> { Err(Boom("first".into())) }).unwrap();
        catch.scope().name("b").run(|| -> Result<(), Boom> { Err(Boom("second".into())) }).unwrap();
        catch.scope().name("a").run(|| -> Result<(), Boom> { Err(Boom("third".into())) }).unwrap();

        assert_eq!(catch.group(Some("a")).len(), 2);
        assert_eq!(catch.group(Some("b")).len(), 1);
        assert_eq!(catch.first().unwrap().message(), "first");
        assert_eq!(catch.last().unwrap().message(), "third");
    }

    #[test]
    fn types_predicate_lets_unmatched_errors_through() {
        let catch: LocalExcept<()> = LocalExcept::default();
        let result = catch
            .scope()
            .types(|e| e.to_string() == "caught me")
            .run(|| -> Result<(), Boom> { Err(Boom("not caught".into())) });
        assert!(result.is_err());
        assert!(catch.last().is_none());
    }

    #[test]
    fn wrap_value_stores_the_return_for_later_retrieval() {
        let catch: LocalExcept<i32> = LocalExcept::default();
        let got = catch.wrap_value(|| -> Result<i32, Boom> { Ok(42) });
        assert_eq!(got, Some(42));
        match catch.get_result(Duration::from_millis(1)) {
            ResultView::Value(v) => assert_eq!(v, 42),
            _ => panic!("expected a value result"),
        }
    }

    #[test]
    fn wrap_value_swallows_errors_and_records_them() {
        let catch: LocalExcept<i32> = LocalExcept::default();
        let got = catch.wrap_value(|| -> Result<i32, Boom> { Err(Boom("nope".into())) });
        assert_eq!(got, None);
        assert_eq!(catch.last().unwrap().message(), "nope");
        assert!(matches!(catch.get_result(Duration::from_millis(1)), ResultView::None));
    }

    #[test]
    fn wrap_value_swallows_even_when_constructed_with_catch_once_false() {
        let catch: LocalExcept<i32> = LocalExcept::new(false, false);
        let got = catch.wrap_value(|| -> Result<i32, Boom> { Err(Boom("nope".into())) });
        assert_eq!(got, None);
        assert_eq!(catch.last().unwrap().message(), "nope");
    }

    #[tokio::test]
    async fn wrap_try_iter_swallows_even_when_constructed_with_catch_once_false() {
        let catch: LocalExcept<i32> = LocalExcept::new(false, false);
        let got = catch.wrap_try_iter(|| -> Result<std::vec::IntoIter<i32>, Boom> { Err(Boom("nope".into())) });
        assert_eq!(got, None);
        assert_eq!(catch.last().unwrap().message(), "nope");
    }

    #[tokio::test]
    async fn except_channel_wrap_value_swallows_with_catch_once_false() {
        let (worker, _parent): (Except<i32>, Except<i32>) = channel(false, false);
        let got = worker.wrap_value(|| -> Result<i32, Boom> { Err(Boom("remote boom".into())) });
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn wrap_iter_streams_everything_yielded() {
        let catch: LocalExcept<i32> = LocalExcept::default();
        catch.wrap_iter(|| vec![1, 2, 3].into_iter());
        match catch.get_result(Duration::from_millis(1)) {
            ResultView::Stream(stream) => {
                use futures::StreamExt;
                let items: Vec<i32> = stream.collect().await;
                assert_eq!(items, vec![1, 2, 3]);
            }
            _ => panic!("expected a stream result"),
        }
    }

    #[test]
    fn raise_any_surfaces_what_was_swallowed() {
        let catch: LocalExcept<()> = LocalExcept::default();
        catch.scope().name("g").run(|| -> Result<(), Boom> { Err(Boom("delayed".into())) }).unwrap();
        let err = catch.raise_any(Some("g")).unwrap_err();
        assert_eq!(err.message(), "delayed");
        assert!(catch.raise_any(Some("other")).is_ok());
    }

    #[test]
    fn clear_resets_groups_and_result() {
        let catch: LocalExcept<i32> = LocalExcept::default();
        catch.wrap_value(|| -> Result<i32, Boom> { Err(Boom("x".into())) });
        catch.clear();
        assert!(catch.last().is_none());
        assert!(matches!(catch.get_result(Duration::from_millis(1)), ResultView::None));
    }

    #[tokio::test]
    async fn except_channel_ferries_the_return_value_across() {
        let (worker, parent): (Except<i32>, Except<i32>) = channel(true, true);
        worker.wrap_value(|| -> Result<i32, Boom> { Ok(7) });
        parent.pull().await;
        match parent.get_result(Duration::from_millis(1)) {
            ResultView::Value(v) => assert_eq!(v, 7),
            _ => panic!("expected a value result"),
        }
    }

    #[tokio::test]
    async fn except_channel_ferries_swallowed_errors_across() {
        let (worker, parent): (Except<i32>, Except<i32>) = channel(true, true);
        worker.wrap_value(|| -> Result<i32, Boom> { Err(Boom("remote boom".into())) });
        parent.pull().await;
        assert_eq!(parent.last().unwrap().message(), "remote boom");
    }

    #[tokio::test]
    async fn except_channel_ferries_yielded_values_across() {
        let (worker, parent): (Except<i32>, Except<i32>) = channel(true, true);
        worker.wrap_iter(|| vec![10, 20].into_iter());
        parent.pull().await;
        match parent.get_result(Duration::from_millis(1)) {
            ResultView::Stream(stream) => {
                use futures::StreamExt;
                let items: Vec<i32> = stream.collect().await;
                assert_eq!(items, vec![10, 20]);
            }
            _ => panic!("expected a stream result"),
        }
    }
}
