//! Links the lifetime of a downstream response to the upstream call serving it.
//!
//! Every chat request owns one [`RequestScope`]. The scope travels with the
//! work: inside the handler future for buffered responses, inside the body
//! stream for streaming ones. Whoever finishes the work calls
//! [`RequestScope::finish`]. If the scope is dropped first, the downstream
//! side went away: the [`AbortSignal`] fires, the upstream call is abandoned
//! and the request is reported as [`RequestOutcome::Cancelled`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::GatewayError;

/// Terminal outcome of one request. Reported exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    Failed { status: u16 },
    Cancelled,
}

impl RequestOutcome {
    #[must_use]
    pub fn from_error(err: &GatewayError) -> Self {
        if err.is_benign() {
            Self::Cancelled
        } else {
            Self::Failed {
                status: err.status().as_u16(),
            }
        }
    }
}

/// Cloneable one-shot cancellation flag.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns `true` only for the call that flipped it.
    pub fn abort(&self) -> bool {
        !self.tx.send_replace(true)
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has fired (immediately if it already has).
    pub async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|aborted| *aborted).await;
    }

    /// Race `fut` against the signal; the future is dropped on abort.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Cancelled` when the signal fires first, otherwise
    /// whatever `fut` returns.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        tokio::select! {
            biased;
            () = self.aborted() => Err(GatewayError::Cancelled),
            result = fut => result,
        }
    }
}

pub type OutcomeReporter = Box<dyn FnOnce(RequestOutcome) + Send>;

/// Drop guard owning the abort signal and the single outcome report of one
/// request.
pub struct RequestScope {
    signal: AbortSignal,
    reporter: Option<OutcomeReporter>,
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("aborted", &self.signal.is_aborted())
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl RequestScope {
    pub fn new<F>(reporter: F) -> Self
    where
        F: FnOnce(RequestOutcome) + Send + 'static,
    {
        Self {
            signal: AbortSignal::new(),
            reporter: Some(Box::new(reporter)),
        }
    }

    #[must_use]
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.reporter.is_some()
    }

    /// Disarm and report `outcome`.
    pub fn finish(mut self, outcome: RequestOutcome) {
        self.report(outcome);
    }

    /// Disarm and report the outcome matching `err`.
    pub fn fail(self, err: &GatewayError) {
        self.finish(RequestOutcome::from_error(err));
    }

    fn report(&mut self, outcome: RequestOutcome) {
        if let Some(reporter) = self.reporter.take() {
            reporter(outcome);
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if !self.is_armed() {
            return;
        }
        self.signal.abort();
        self.report(RequestOutcome::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn recording_scope() -> (RequestScope, Arc<Mutex<Vec<RequestOutcome>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let scope = RequestScope::new(move |outcome| sink.lock().unwrap().push(outcome));
        (scope, seen)
    }

    #[test]
    fn test_finish_reports_once_and_does_not_abort() {
        let (scope, seen) = recording_scope();
        let signal = scope.signal().clone();
        scope.finish(RequestOutcome::Completed);
        assert_eq!(*seen.lock().unwrap(), vec![RequestOutcome::Completed]);
        assert!(!signal.is_aborted());
    }

    #[test]
    fn test_drop_while_armed_aborts_and_reports_cancelled() {
        let (scope, seen) = recording_scope();
        let signal = scope.signal().clone();
        drop(scope);
        assert!(signal.is_aborted());
        assert_eq!(*seen.lock().unwrap(), vec![RequestOutcome::Cancelled]);
    }

    #[test]
    fn test_fail_maps_errors_to_outcomes() {
        let (scope, seen) = recording_scope();
        scope.fail(&GatewayError::Upstream {
            status: 503,
            message: "busy".into(),
        });
        let (scope2, seen2) = recording_scope();
        scope2.fail(&GatewayError::Cancelled);
        assert_eq!(*seen.lock().unwrap(), vec![RequestOutcome::Failed { status: 503 }]);
        assert_eq!(*seen2.lock().unwrap(), vec![RequestOutcome::Cancelled]);
    }

    #[test]
    fn test_abort_flips_once() {
        let signal = AbortSignal::new();
        assert!(signal.abort());
        assert!(!signal.abort());
        assert!(signal.clone().is_aborted());
    }

    #[tokio::test]
    async fn test_guard_cancels_pending_future() {
        let signal = AbortSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.abort();
        });
        let result: Result<(), GatewayError> = signal
            .guard(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let signal = AbortSignal::new();
        let result = signal.guard(async { Ok::<_, GatewayError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_aborted_resolves_when_already_fired() {
        let signal = AbortSignal::new();
        signal.abort();
        tokio::time::timeout(Duration::from_secs(1), signal.aborted())
            .await
            .unwrap();
    }
}
