pub mod builders;
pub mod probe;

use std::sync::mpsc;
use std::sync::Once;
use std::thread;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .with_thread_names(true)
            .init();
    });
}

/// Default deadline for pool tests. A deadlock shows up as a failure
/// instead of a hung test run.
pub const DEADLINE: Duration = Duration::from_secs(10);

/// Run `f` on its own thread and wait at most `limit` for it.
///
/// Panics if `f` takes longer; a panic inside `f` is resumed on the caller.
pub fn with_deadline<T, F>(limit: Duration, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("test-deadline".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        })
        .expect("spawning test thread");

    match rx.recv_timeout(limit) {
        Ok(value) => value,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {limit:?} (deadlock?)")
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match handle.join() {
            Err(payload) => std::panic::resume_unwind(payload),
            Ok(()) => panic!("test thread exited without a result"),
        },
    }
}

/// [`with_deadline`] with the default [`DEADLINE`].
pub fn within_deadline<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    with_deadline(DEADLINE, f)
}
