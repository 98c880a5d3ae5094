//! Process-mode transport: a length-prefixed JSON frame carrying the
//! target's outcome from the re-exec'd child back to the parent.
//!
//! Unlike thread mode (which streams yielded values incrementally through
//! `except::Except`'s in-memory channel), process mode reports a single
//! final outcome once the child exits — there is no cheap way to keep a
//! live channel open across a process boundary without a transport the
//! rest of this workspace doesn't otherwise need. A child that yields is
//! still fully drained locally; the parent just sees the whole batch at
//! once rather than item-by-item.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use except::{LocalExcept, RemoteException, ResultView};

pub const ENTRY_ENV: &str = "CHAINPROXY_WORKER_ENTRY";
pub const ARGS_ENV: &str = "CHAINPROXY_WORKER_ARGS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireOutcome {
    Return(serde_json::Value),
    Yielded(Vec<serde_json::Value>),
    Error { type_name: String, message: String, traceback: Option<String> },
}

fn write_frame_sync<W: io::Write>(w: &mut W, value: &WireOutcome) -> io::Result<()> {
    let bytes = serde_json::to_vec(value).map_err(io::Error::other)?;
    w.write_all(&(bytes.len() as u32).to_be_bytes())?;
    w.write_all(&bytes)?;
    w.flush()
}

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Option<WireOutcome>> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            tracing::debug!("worker process closed stdout without writing a frame");
            return Ok(None);
        }
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf).map(Some).map_err(io::Error::other)
}

/// Call at the very top of `main()`, before anything else touches stdio.
/// If this process was re-exec'd to run a registered entry point, runs
/// it, writes one framed [`WireOutcome`] to stdout, and exits — this
/// function never returns in that case. Otherwise it returns immediately
/// so the binary's ordinary `main()` proceeds.
pub fn maybe_run_as_worker() {
    let Ok(entry) = std::env::var(ENTRY_ENV) else { return };
    let args: serde_json::Value = std::env::var(ARGS_ENV)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);

    let catch: LocalExcept<serde_json::Value> = LocalExcept::new(false, true);
    match crate::registry::lookup(&entry) {
        Some(func) => {
            catch.wrap_value(|| func(args));
        }
        None => catch.set(
            RemoteException::new("UnknownEntryPoint", format!("no entry point registered under name '{entry}'"), None),
            None,
        ),
    }

    let outcome = match catch.last() {
        Some(exc) => WireOutcome::Error {
            type_name: exc.type_name().to_string(),
            message: exc.message().to_string(),
            traceback: exc.remote_traceback().map(str::to_string),
        },
        None => match catch.get_result(std::time::Duration::from_millis(1)) {
            ResultView::Value(v) => WireOutcome::Return(v),
            ResultView::None => WireOutcome::Return(serde_json::Value::Null),
            ResultView::Stream(_) => {
                // Yield results finish synchronously in-process (the
                // underlying queue is already fully populated and closed
                // by the time wrap_value/wrap_iter above returns), so we
                // can safely drain it with a blocking runtime here rather
                // than threading async through `main()`.
                let items = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .expect("build a throwaway runtime to drain the result stream")
                    .block_on(async {
                        use futures::StreamExt;
                        match catch.get_result(std::time::Duration::from_millis(1)) {
                            ResultView::Stream(s) => s.collect::<Vec<_>>().await,
                            _ => Vec::new(),
                        }
                    });
                WireOutcome::Yielded(items)
            }
        },
    };

    let mut stdout = io::stdout();
    let _ = write_frame_sync(&mut stdout, &outcome);
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_return_frame_round_trips_through_write_and_read() {
        let mut buf = Vec::new();
        write_frame_sync(&mut buf, &WireOutcome::Return(serde_json::json!(42))).unwrap();
        match read_frame(&mut buf.as_slice()).await.unwrap().unwrap() {
            WireOutcome::Return(v) => assert_eq!(v, serde_json::json!(42)),
            other => panic!("expected a Return frame, got {other:?}"),
        }
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn an_empty_stream_reads_as_a_clean_close_and_logs_it() {
        let got = read_frame(&mut &b""[..]).await.unwrap();
        assert!(got.is_none());
        assert!(logs_contain("closed stdout without writing a frame"));
    }
}
