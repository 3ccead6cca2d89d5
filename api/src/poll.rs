use std::sync::{
    atomic::{AtomicBool, Ordering::SeqCst},
    Arc,
};
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::{
    error::{Error, Result},
    resources::operation::Operation,
};

/// Configuration for waiting on long-running operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Time to wait between consecutive polls.
    pub interval: Duration,
    /// Upper bound on the total time spent waiting for one operation.
    /// `None` waits indefinitely (until cancelled).
    pub timeout: Option<Duration>,
}

impl PollConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            timeout: Some(Self::DEFAULT_TIMEOUT),
        }
    }
}

/// Handle to interrupt a poll loop from another thread. Cancellation is
/// observed between sleep intervals, never mid-request.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(SeqCst)
    }
}

/// Blocks until a long-running operation reaches a terminal state.
#[derive(Debug)]
pub struct Poller {
    config: PollConfig,
    cancelled: CancellationToken,
}

impl Poller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            cancelled: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancelled.clone()
    }

    /// Poll `poll` until the operation is done.
    ///
    /// A poll returning an error terminates the wait with that error (a
    /// failed poll is final, not retried). A finished operation carrying a
    /// server-reported error terminates as [`Error::OperationFailed`].
    pub fn wait(
        &self,
        name: &str,
        mut poll: impl FnMut() -> Result<Operation>,
    ) -> Result<Operation> {
        let started = Instant::now();

        loop {
            if self.cancelled.is_cancelled() {
                return Err(Error::PollCancelled { name: name.into() });
            }

            let operation = poll()?;
            if operation.done {
                if let Some(status) = &operation.error {
                    return Err(Error::OperationFailed {
                        name: name.into(),
                        message: status.to_message(),
                    });
                }
                log::debug!("Operation `{name}` completed.");
                return Ok(operation);
            }

            if let Some(timeout) = self.config.timeout {
                if started.elapsed() >= timeout {
                    return Err(Error::PollTimeout {
                        name: name.into(),
                        timeout,
                    });
                }
            }
            log::debug!(
                "Operation `{}` still running, polling again in {:?}.",
                name,
                self.config.interval
            );
            sleep(self.config.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::operation::OperationStatus;

    fn scripted(
        responses: Vec<Operation>,
        polls: Arc<std::sync::atomic::AtomicUsize>,
    ) -> impl FnMut() -> Result<Operation> {
        let mut responses = responses.into_iter();
        move || {
            polls.fetch_add(1, SeqCst);
            Ok(responses.next().expect("polled past end of script"))
        }
    }

    fn pending() -> Operation {
        Operation {
            name: "projects/p/operations/op".into(),
            done: false,
            error: None,
        }
    }

    fn done() -> Operation {
        Operation {
            done: true,
            ..pending()
        }
    }

    fn instant_poller() -> Poller {
        Poller::new(PollConfig {
            interval: Duration::from_secs(0),
            timeout: Some(Duration::from_secs(60)),
        })
    }

    #[test]
    fn test_terminates_done_after_three_polls() {
        let polls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let result = instant_poller().wait(
            "projects/p/operations/op",
            scripted(vec![pending(), pending(), done()], polls.clone()),
        );
        assert!(result.unwrap().done);
        assert_eq!(polls.load(SeqCst), 3);
    }

    #[test]
    fn test_terminates_failed_after_one_poll() {
        let polls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let failed = Operation {
            error: Some(OperationStatus {
                code: Some(13),
                message: Some("backend exploded".into()),
            }),
            ..done()
        };
        let result = instant_poller().wait(
            "projects/p/operations/op",
            scripted(vec![failed], polls.clone()),
        );
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
        assert_eq!(polls.load(SeqCst), 1);
    }

    #[test]
    fn test_poll_error_is_final() {
        let polls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let polls_in_closure = polls.clone();
        let result = instant_poller().wait("projects/p/operations/op", move || {
            polls_in_closure.fetch_add(1, SeqCst);
            Err(Error::Api {
                status_code: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                message: "poll failed".into(),
            })
        });
        assert!(matches!(result, Err(Error::Api { .. })));
        assert_eq!(polls.load(SeqCst), 1);
    }

    #[test]
    fn test_timeout() {
        let poller = Poller::new(PollConfig {
            interval: Duration::from_millis(1),
            timeout: Some(Duration::from_millis(0)),
        });
        let result = poller.wait("projects/p/operations/op", || Ok(pending()));
        assert!(matches!(result, Err(Error::PollTimeout { .. })));
    }

    #[test]
    fn test_cancellation() {
        let poller = instant_poller();
        poller.cancellation_token().cancel();
        let result = poller.wait("projects/p/operations/op", || {
            panic!("must not poll after cancellation")
        });
        assert!(matches!(result, Err(Error::PollCancelled { .. })));
    }
}
