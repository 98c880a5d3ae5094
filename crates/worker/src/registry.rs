use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use lazy_static::lazy_static;

/// The error type a registered process-mode entry point returns. Just a
/// message: process-mode targets cross an exec boundary, so there is no
/// live exception value to preserve beyond its string form anyway.
#[derive(Debug)]
pub struct EntryError(pub String);

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EntryError {}

pub type EntryFn = fn(serde_json::Value) -> Result<serde_json::Value, EntryError>;

lazy_static! {
    static ref REGISTRY: Mutex<HashMap<String, EntryFn>> = Mutex::new(HashMap::new());
}

/// Register a top-level function under `name` so a process-mode job can
/// re-exec this binary and run it. A fresh process starts with an empty
/// registry — register every entry point unconditionally near the top of
/// `main()`, before any job is spawned, not lazily on first use.
pub fn register(name: &str, func: EntryFn) {
    REGISTRY.lock().unwrap().insert(name.to_string(), func);
}

pub fn lookup(name: &str) -> Option<EntryFn> {
    REGISTRY.lock().unwrap().get(name).copied()
}
