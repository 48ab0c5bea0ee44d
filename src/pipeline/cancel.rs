//! Cancellation token and the keyboard quit listener
//!
//! The token is a set-once flag shared by every component. Its `sleep` wakes
//! early when the token is cancelled, so shutdown latency is bounded by the
//! time a loop needs to reach its next check rather than by its longest sleep.

use crossbeam_channel::{unbounded, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Process-wide stop signal. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every sleeper. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Cancellation requested");
        }
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until cancelled.
    ///
    /// Returns `true` if the full duration elapsed, `false` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }

        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        while !self.is_cancelled() {
            if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                return !self.is_cancelled();
            }
        }
        false
    }
}

/// Watches a line-oriented input for a quit request
///
/// Reading stdin blocks and cannot be interrupted portably, so the actual read
/// happens on a detached helper thread that forwards lines over a channel. The
/// listener itself polls that channel and the token, and can always be joined.
pub struct QuitListener {
    handle: JoinHandle<()>,
}

impl QuitListener {
    /// Listen on the process's stdin
    pub fn spawn_stdin(token: CancellationToken, poll: Duration) -> std::io::Result<Self> {
        Self::spawn(std::io::BufReader::new(std::io::stdin()), token, poll)
    }

    /// Listen on any reader; cancels on a line containing 'q'
    pub fn spawn<R>(reader: R, token: CancellationToken, poll: Duration) -> std::io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (line_tx, line_rx) = unbounded::<String>();

        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if line_tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read input");
                            break;
                        }
                    }
                }
            })?;

        let handle = thread::Builder::new()
            .name("quit-listener".into())
            .spawn(move || {
                while !token.is_cancelled() {
                    match line_rx.recv_timeout(poll) {
                        Ok(line) => {
                            if line.to_lowercase().contains('q') {
                                info!("Stop requested from keyboard");
                                token.cancel();
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        // Input closed: nothing more can arrive, keep polling
                        // the token only
                        Err(RecvTimeoutError::Disconnected) => {
                            token.sleep(poll);
                        }
                    }
                }
                debug!("Quit listener stopped");
            })?;

        Ok(Self { handle })
    }

    /// Wait for the listener to observe cancellation and exit
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_token_is_shared_and_set_once() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_sleep_runs_full_duration_when_not_cancelled() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let token = CancellationToken::new();
        let sleeper = token.clone();
        let (tx, rx) = crossbeam_channel::bounded(1);

        thread::spawn(move || {
            let completed = sleeper.sleep(Duration::from_secs(30));
            tx.send(completed).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let completed = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(!completed);
    }

    #[test]
    fn test_sleep_after_cancel_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_listener_cancels_on_q() {
        let token = CancellationToken::new();
        let input = Cursor::new("hello\nQ\n");
        let listener =
            QuitListener::spawn(input, token.clone(), Duration::from_millis(10)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !token.is_cancelled() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(token.is_cancelled());
        listener.join().unwrap();
    }

    #[test]
    fn test_listener_exits_on_external_cancel() {
        let token = CancellationToken::new();
        let listener = QuitListener::spawn(
            Cursor::new("nothing to see\n"),
            token.clone(),
            Duration::from_millis(10),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert!(!token.is_cancelled());

        token.cancel();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !listener.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(listener.is_finished());
        listener.join().unwrap();
    }
}
