//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Bounded completion polling for asynchronous remote mutations."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use rig_client::{CompletionProbe, OperationTarget, PendingOperation, TerminalState};
use rig_common::PollingConfig;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::metrics::HarnessMetrics;

/// Lower bound on the sleep between two progress checks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How often to check and how long to wait in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Configured interval, raised to [`MIN_POLL_INTERVAL`].
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_secs(300))
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self::new(config.interval, config.timeout)
    }
}

/// Terminal outcome of a pending operation plus the state read back after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<T> {
    pub target: OperationTarget,
    pub state: TerminalState,
    pub settled: T,
    pub polls: u32,
    pub elapsed: Duration,
}

impl<T> Completion<T> {
    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }

    pub fn failure_message(&self) -> Option<&str> {
        match &self.state {
            TerminalState::Failed { message } => Some(message),
            TerminalState::Succeeded => None,
        }
    }
}

/// Suspends the calling test until a pending operation reaches a terminal
/// state or the policy timeout expires.
///
/// Expiry abandons only the wait. The server-side operation keeps running.
#[derive(Debug, Clone, Default)]
pub struct CompletionPoller {
    policy: PollPolicy,
    metrics: Option<HarnessMetrics>,
}

impl CompletionPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: HarnessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub async fn await_completion<P>(
        &self,
        probe: &P,
        pending: &PendingOperation,
    ) -> HarnessResult<Completion<P::Settled>>
    where
        P: CompletionProbe + ?Sized,
    {
        self.await_completion_with(probe, pending, self.policy).await
    }

    /// Like [`Self::await_completion`] with a one-off policy.
    pub async fn await_completion_with<P>(
        &self,
        probe: &P,
        pending: &PendingOperation,
        policy: PollPolicy,
    ) -> HarnessResult<Completion<P::Settled>>
    where
        P: CompletionProbe + ?Sized,
    {
        let target = pending.target;
        let interval = policy.effective_interval();
        let started = Instant::now();
        let mut polls = 0u32;
        let mut warned = false;

        loop {
            polls += 1;
            if let Some(metrics) = &self.metrics {
                metrics.inc_poll(target.domain);
            }
            let status = probe.status(target).await?;
            if let Some(state) = TerminalState::from_status(status) {
                let elapsed = started.elapsed();
                if let Some(metrics) = &self.metrics {
                    metrics.observe_completion(target.domain, state.is_success(), elapsed);
                }
                info!(
                    target = %target,
                    polls,
                    elapsed_ms = elapsed.as_millis() as u64,
                    succeeded = state.is_success(),
                    "operation reached terminal state"
                );
                let settled = probe.settle(target).await?;
                return Ok(Completion {
                    target,
                    state,
                    settled,
                    polls,
                    elapsed,
                });
            }

            let elapsed = started.elapsed();
            if elapsed >= policy.timeout {
                if let Some(metrics) = &self.metrics {
                    metrics.record_timeout(target.domain);
                }
                warn!(target = %target, polls, "gave up waiting for operation");
                return Err(HarnessError::PollingTimeout {
                    target,
                    waited: elapsed,
                    polls,
                });
            }
            if !warned && elapsed >= policy.timeout / 2 {
                warned = true;
                warn!(
                    target = %target,
                    elapsed_ms = elapsed.as_millis() as u64,
                    timeout_ms = policy.timeout.as_millis() as u64,
                    "operation still in progress past half the timeout"
                );
            }

            // The last sleep is cut short so the final check lands at the deadline.
            let remaining = policy.timeout - elapsed;
            let pause = interval.min(remaining);
            debug!(target = %target, polls, pause_ms = pause.as_millis() as u64, "operation in progress");
            sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use rig_client::{ClientError, ClientResult, EntityId, OperationDomain, OperationStatus};

    use super::*;

    /// Reports in progress for `busy_polls` checks, then `terminal`.
    struct ScriptedProbe {
        busy_polls: u32,
        terminal: OperationStatus,
        checks: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(busy_polls: u32, terminal: OperationStatus) -> Self {
            Self {
                busy_polls,
                terminal,
                checks: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionProbe for ScriptedProbe {
        type Settled = u32;

        async fn status(&self, _target: OperationTarget) -> ClientResult<OperationStatus> {
            let seen = self.checks.fetch_add(1, Ordering::SeqCst);
            if seen < self.busy_polls {
                Ok(OperationStatus::InProgress)
            } else {
                Ok(self.terminal.clone())
            }
        }

        async fn settle(&self, _target: OperationTarget) -> ClientResult<u32> {
            Ok(self.checks.load(Ordering::SeqCst))
        }
    }

    fn pending() -> PendingOperation {
        PendingOperation::new(
            OperationTarget::new(OperationDomain::ResourceConfiguration, EntityId(11)),
            chrono::Utc::now(),
        )
    }

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(25), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn returns_once_terminal_and_settles() {
        let probe = ScriptedProbe::new(3, OperationStatus::Succeeded);
        let completion = CompletionPoller::new(fast())
            .await_completion(&probe, &pending())
            .await
            .unwrap();
        assert!(completion.is_success());
        assert_eq!(completion.polls, 4);
        assert_eq!(completion.settled, 4);
        assert!(completion.elapsed >= Duration::from_millis(75));
    }

    #[tokio::test]
    async fn failed_operations_are_terminal_too() {
        let probe = ScriptedProbe::new(
            0,
            OperationStatus::Failed {
                message: "agent unreachable".into(),
            },
        );
        let completion = CompletionPoller::new(fast())
            .await_completion(&probe, &pending())
            .await
            .unwrap();
        assert!(!completion.is_success());
        assert_eq!(completion.failure_message(), Some("agent unreachable"));
        assert_eq!(completion.polls, 1);
    }

    #[tokio::test]
    async fn times_out_no_earlier_than_the_deadline() {
        let probe = ScriptedProbe::new(u32::MAX, OperationStatus::Succeeded);
        let policy = PollPolicy::new(Duration::from_millis(30), Duration::from_millis(200));
        let started = Instant::now();
        let err = CompletionPoller::default()
            .await_completion_with(&probe, &pending(), policy)
            .await
            .unwrap_err();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_millis(200) + Duration::from_millis(30) + Duration::from_millis(150));
        match err {
            HarnessError::PollingTimeout { waited, polls, .. } => {
                assert!(waited >= Duration::from_millis(200));
                assert!(polls >= 2);
            }
            other => panic!("expected a polling timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        assert_eq!(
            PollPolicy::new(Duration::ZERO, Duration::from_secs(1)).effective_interval(),
            MIN_POLL_INTERVAL
        );
        let probe = ScriptedProbe::new(u32::MAX, OperationStatus::Succeeded);
        let policy = PollPolicy::new(Duration::ZERO, Duration::from_millis(250));
        let _ = CompletionPoller::default()
            .await_completion_with(&probe, &pending(), policy)
            .await;
        // 250ms at one check per 25ms allows at most eleven checks.
        assert!(probe.checks.load(Ordering::SeqCst) <= 11);
    }

    #[tokio::test]
    async fn probe_errors_propagate() {
        struct Expired;

        #[async_trait]
        impl CompletionProbe for Expired {
            type Settled = ();

            async fn status(&self, _target: OperationTarget) -> ClientResult<OperationStatus> {
                Err(ClientError::SessionExpired)
            }

            async fn settle(&self, _target: OperationTarget) -> ClientResult<()> {
                Ok(())
            }
        }

        let err = CompletionPoller::new(fast())
            .await_completion(&Expired, &pending())
            .await
            .unwrap_err();
        assert!(err.is_session_expired());
    }
}
