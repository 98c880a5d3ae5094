use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::capture::RemoteException;

type Predicate = Arc<dyn Fn(&dyn std::error::Error) -> bool + Send + Sync>;

/// Exceptions grouped by the name their scope was given, in first-seen
/// group order, plus overall first/last regardless of group. `IndexMap`
/// keeps group-creation order for free instead of tracking it alongside
/// a `HashMap` by hand.
struct Groups {
    by_group: IndexMap<Option<String>, Vec<RemoteException>>,
    first: Option<RemoteException>,
    last: Option<RemoteException>,
}

impl Groups {
    fn new() -> Self {
        Self { by_group: IndexMap::new(), first: None, last: None }
    }

    fn record(&mut self, group: Option<String>, exc: RemoteException) {
        if self.first.is_none() {
            self.first = Some(exc.clone());
        }
        self.last = Some(exc.clone());
        self.by_group.entry(group).or_default().push(exc);
    }

    fn clear(&mut self) {
        self.by_group.clear();
        self.first = None;
        self.last = None;
    }
}

/// What a wrapped function produced: nothing yet, a single value, or an
/// in-progress/finished stream of yielded values.
enum ResultSlot<T> {
    Value(T),
    Yield(Arc<Mutex<VecDeque<T>>>, Arc<AtomicBool>),
}

struct State<T> {
    groups: Groups,
    result: Option<ResultSlot<T>>,
}

/// The view [`LocalExcept::get_result`] hands back: nothing was produced,
/// a single value was, or a stream of yielded values was (possibly still
/// being produced by a concurrently running worker).
pub enum ResultView<T> {
    None,
    Value(T),
    Stream(std::pin::Pin<Box<dyn futures::Stream<Item = T> + Send>>),
}

/// Catches exceptions raised inside scopes, grouping them by name, and
/// separately records whatever value (or stream of values) a wrapped
/// function produced.
///
/// This is the in-process half of the facility: everything here runs
/// synchronously against a `std::sync::Mutex`-guarded state, with no
/// channel or process boundary involved. [`Except`](crate::Except) builds
/// on top of this to additionally ferry records out of a worker.
pub struct LocalExcept<T = serde_json::Value> {
    default_raises: bool,
    default_catch_once: bool,
    state: Mutex<State<T>>,
}

impl<T> Default for LocalExcept<T> {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl<T> LocalExcept<T> {
    pub fn new(raises: bool, catch_once: bool) -> Self {
        Self {
            default_raises: raises,
            default_catch_once: catch_once,
            state: Mutex::new(State { groups: Groups::new(), result: None }),
        }
    }

    /// Begin configuring a scope. Call `.run(...)` on the result to
    /// actually execute something inside it.
    pub fn scope(&self) -> ScopeConfig<'_, T> {
        ScopeConfig {
            catch: self,
            name: None,
            raises: self.default_raises,
            catch_once: self.default_catch_once,
            predicate: None,
        }
    }

    pub(crate) fn record(&self, group: Option<String>, exc: RemoteException) {
        self.state.lock().unwrap().groups.record(group, exc);
    }

    /// Directly insert a record under `group`, bypassing scope execution —
    /// used by [`Except::pull`](crate::Except::pull) to fold in records
    /// that arrived from a worker.
    pub fn set(&self, exc: RemoteException, group: Option<String>) {
        self.record(group, exc);
    }

    /// The most recent exception recorded in `group` (or the default group
    /// when `group` is `None`).
    pub fn get(&self, group: Option<&str>) -> Option<RemoteException> {
        let state = self.state.lock().unwrap();
        state.groups.by_group.get(&group.map(str::to_string)).and_then(|v| v.last().cloned())
    }

    /// Every record recorded in `group`, in capture order.
    pub fn group(&self, group: Option<&str>) -> Vec<RemoteException> {
        let state = self.state.lock().unwrap();
        state.groups.by_group.get(&group.map(str::to_string)).cloned().unwrap_or_default()
    }

    /// Every record across every group, in group-creation order, each
    /// group's own records in capture order within it.
    pub fn all(&self) -> Vec<(Option<String>, RemoteException)> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .by_group
            .iter()
            .flat_map(|(g, v)| v.iter().map(move |e| (g.clone(), e.clone())))
            .collect()
    }

    /// The very first exception recorded, across all groups.
    pub fn first(&self) -> Option<RemoteException> {
        self.state.lock().unwrap().groups.first.clone()
    }

    /// The most recently recorded exception, across all groups.
    pub fn last(&self) -> Option<RemoteException> {
        self.state.lock().unwrap().groups.last.clone()
    }

    /// If `group` (or overall, when `None`) has anything recorded, return
    /// it as an `Err`; otherwise `Ok(())`. For re-raising what a scope
    /// swallowed earlier.
    pub fn raise_any(&self, group: Option<&str>) -> Result<(), RemoteException> {
        match group {
            Some(g) => match self.get(Some(g)) {
                Some(e) => Err(e),
                None => Ok(()),
            },
            None => match self.last() {
                Some(e) => Err(e),
                None => Ok(()),
            },
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.groups.clear();
        state.result = None;
    }

    pub fn set_result(&self, value: T) {
        self.state.lock().unwrap().result = Some(ResultSlot::Value(value));
    }

    fn yield_slot(state: &mut State<T>) -> (Arc<Mutex<VecDeque<T>>>, Arc<AtomicBool>) {
        match &state.result {
            Some(ResultSlot::Yield(q, c)) => (q.clone(), c.clone()),
            _ => {
                let q = Arc::new(Mutex::new(VecDeque::new()));
                let c = Arc::new(AtomicBool::new(false));
                state.result = Some(ResultSlot::Yield(q.clone(), c.clone()));
                (q, c)
            }
        }
    }

    pub fn push_yield(&self, value: T) {
        let mut state = self.state.lock().unwrap();
        let (queue, _) = Self::yield_slot(&mut state);
        queue.lock().unwrap().push_back(value);
    }

    /// Marks the yielded sequence exhausted. Idempotent; always called,
    /// success or failure, the way a generator's `finally` block runs.
    pub fn close_yield(&self) {
        let mut state = self.state.lock().unwrap();
        let (_, closed) = Self::yield_slot(&mut state);
        closed.store(true, Ordering::Release);
    }

    /// Run `f`, recording any error under the default scope and never
    /// propagating it (matches the wrapping a worker target function gets
    /// automatically), storing a successful return as the result.
    pub fn wrap_value<E>(&self, f: impl FnOnce() -> Result<T, E>) -> Option<T>
    where
        T: Clone,
        E: std::error::Error + 'static,
    {
        match self.scope().raises(false).catch_once(true).run(f) {
            Ok(Some(v)) => {
                self.set_result(v.clone());
                Some(v)
            }
            Ok(None) => None,
            Err(_) => unreachable!("raises(false).catch_once(true) scopes never propagate"),
        }
    }

    /// Run `f` to get an iterator, push every item it produces, then close
    /// the stream. Never swallows errors, because the iterator is
    /// infallible at the type level — use [`wrap_try_iter`] when the
    /// producing step itself can fail.
    pub fn wrap_iter<I: Iterator<Item = T>>(&self, f: impl FnOnce() -> I) {
        for item in f() {
            self.push_yield(item);
        }
        self.close_yield();
    }

    /// As [`wrap_iter`], but `f` itself may fail before producing an
    /// iterator at all; a failure is recorded under the default scope
    /// rather than propagated. The stream is always closed.
    pub fn wrap_try_iter<I, E>(&self, f: impl FnOnce() -> Result<I, E>) -> Option<()>
    where
        I: Iterator<Item = T>,
        E: std::error::Error + 'static,
    {
        let result = self.scope().raises(false).catch_once(true).run(|| -> Result<(), E> {
            for item in f()? {
                self.push_yield(item);
            }
            Ok(())
        });
        self.close_yield();
        match result {
            Ok(v) => v,
            Err(_) => unreachable!("raises(false).catch_once(true) scopes never propagate"),
        }
    }

    /// Take whatever the wrapped function produced. `poll_interval`
    /// governs how often a `Stream` result re-checks for new items while
    /// waiting on a producer that hasn't closed yet.
    pub fn get_result(&self, poll_interval: std::time::Duration) -> ResultView<T>
    where
        T: Send + 'static,
    {
        let mut state = self.state.lock().unwrap();
        match state.result.take() {
            None => ResultView::None,
            Some(ResultSlot::Value(v)) => ResultView::Value(v),
            Some(ResultSlot::Yield(queue, closed)) => {
                state.result = Some(ResultSlot::Yield(queue.clone(), closed.clone()));
                let stream = async_stream::stream! {
                    loop {
                        let next = queue.lock().unwrap().pop_front();
                        match next {
                            Some(v) => yield v,
                            None => {
                                if closed.load(Ordering::Acquire) {
                                    return;
                                }
                                tokio::time::sleep(poll_interval).await;
                            }
                        }
                    }
                };
                ResultView::Stream(Box::pin(stream))
            }
        }
    }
}

/// Builder for a single scope, returned by [`LocalExcept::scope`].
pub struct ScopeConfig<'a, T> {
    catch: &'a LocalExcept<T>,
    name: Option<String>,
    raises: bool,
    catch_once: bool,
    predicate: Option<Predicate>,
}

impl<'a, T> ScopeConfig<'a, T> {
    /// Group name exceptions caught here are filed under.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Re-raise after recording, regardless of `catch_once`.
    pub fn raises(mut self, raises: bool) -> Self {
        self.raises = raises;
        self
    }

    /// When `false`, forces `raises` to effectively `true` — a scope that
    /// isn't willing to catch only once isn't willing to swallow at all.
    pub fn catch_once(mut self, catch_once: bool) -> Self {
        self.catch_once = catch_once;
        self
    }

    /// Only record errors `predicate` accepts; anything else passes
    /// through untouched.
    pub fn types(mut self, predicate: impl Fn(&dyn std::error::Error) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Run `f`. `Ok(Some(value))` on success, `Ok(None)` if an error was
    /// recorded and swallowed, `Err(error)` if it was recorded and
    /// re-raised (or rejected by `types` and passed straight through).
    pub fn run<R, E>(&self, f: impl FnOnce() -> Result<R, E>) -> Result<Option<R>, E>
    where
        E: std::error::Error + 'static,
    {
        match f() {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                if let Some(pred) = &self.predicate {
                    if !pred(&e as &dyn std::error::Error) {
                        return Err(e);
                    }
                }
                let effective_raises = self.raises || !self.catch_once;
                let mut record = RemoteException::capture(&e, self.name.as_deref());
                record.tag(self.name.as_deref());
                self.catch.record(self.name.clone(), record);
                if effective_raises {
                    Err(e)
                } else {
                    Ok(None)
                }
            }
        }
    }
}
