use std::sync::atomic::{AtomicU64, Ordering};

static THREAD_COUNTER: AtomicU64 = AtomicU64::new(0);
static PROCESS_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A default worker name: `<base>-<n>`, `n` drawn from a monotonic
/// counter kept separately per execution mode (spawning ten threads and
/// then one process yields `worker-0`, not `worker-10`).
pub fn default_name(threaded: bool, base: &str) -> String {
    let counter = if threaded { &THREAD_COUNTER } else { &PROCESS_COUNTER };
    let n = counter.fetch_add(1, Ordering::Relaxed);
    format!("{base}-{n}")
}
