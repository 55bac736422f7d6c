use std::{
    io,
    sync::{Mutex, Once},
    thread,
    time::{Duration, Instant},
};

use log::LevelFilter;

static LOGGER_INIT: Once = Once::new();

// Every formatted log line of this test binary, for tests that check what was logged.
static CAPTURED: Mutex<Vec<String>> = Mutex::new(Vec::new());

// Set up a logger that logs all log messages with `level` and above.
pub(crate) fn setup_logger(level: LevelFilter) {
    LOGGER_INIT.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{:?}][{}] {}",
                    thread::current().id(),
                    record.level(),
                    message
                ))
            })
            .level(level)
            .chain(io::stdout())
            .chain(fern::Output::call(|record| {
                CAPTURED.lock().unwrap().push(record.args().to_string())
            }))
            .apply()
            .unwrap();
    })
}

// Poll `condition` until it holds or `timeout` elapses. Returns whether it held.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

// Check whether any line logged so far contains every one of `fragments`.
pub(crate) fn logged(fragments: &[&str]) -> bool {
    CAPTURED
        .lock()
        .unwrap()
        .iter()
        .any(|line| fragments.iter().all(|fragment| line.contains(fragment)))
}
