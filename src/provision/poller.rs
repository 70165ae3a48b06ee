//! Provisioning wait loop.
//!
//! [`poll_until`] is a fixed-delay retry primitive with a hard wall-clock
//! deadline and a cancellation signal checked before every query and during
//! every sleep. [`ProvisioningPoller`] applies it to "wait for the server
//! carrying this service ID to show up".

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProviderSettings;
use crate::error::{ProvisionError, Result};
use crate::ics::{IcsApi, Server};

/// Default delay between provisioning polls in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default provisioning deadline in seconds.
pub const DEFAULT_PROVISION_TIMEOUT_SECS: u64 = 30 * 60;

/// Interval and deadline for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed delay between queries.
    pub interval: Duration,
    /// Wall-clock limit measured from the first query.
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            deadline: Duration::from_secs(DEFAULT_PROVISION_TIMEOUT_SECS),
        }
    }
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// Takes interval and deadline from provider settings.
    #[must_use]
    pub const fn from_settings(settings: &ProviderSettings) -> Self {
        Self::new(settings.poll_interval, settings.provision_timeout)
    }
}

/// Receiving side of a cancellation signal.
///
/// Clones observe the same signal. A signal whose handle was dropped without
/// cancelling never fires.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Sending side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Creates a connected cancellation handle and signal.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

impl CancelHandle {
    /// Signals cancellation to every receiver.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that is never cancelled.
    #[must_use]
    pub const fn never() -> Self {
        Self { rx: None }
    }

    /// Returns true if cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Completes once cancellation is signalled.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };

        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling.
                return std::future::pending().await;
            }
        }
    }
}

/// Relays interrupts to `handle`.
///
/// The first interrupt requests a cooperative stop. Returns true if a second
/// one arrives, in which case the caller should exit without waiting for the
/// current step. `interrupt` resolves to false when no more interrupts can be
/// observed.
pub async fn relay_interrupts<F, Fut>(handle: CancelHandle, mut interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !interrupt().await {
        return false;
    }
    warn!("Interrupt received; stopping after the current step (press Ctrl-C again to exit now)");
    handle.cancel();

    if !interrupt().await {
        return false;
    }
    warn!("Second interrupt received; exiting immediately");
    true
}

/// Query counters for a poll loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Queries issued.
    pub attempts: u32,
    /// Queries that failed outright rather than reporting "not yet".
    pub failures: u32,
}

/// How a poll loop ended.
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// The probe produced a value.
    Ready(T),
    /// The deadline passed first.
    TimedOut {
        /// Query counters.
        stats: PollStats,
        /// Time spent.
        elapsed: Duration,
    },
    /// Cancellation was signalled first.
    Cancelled {
        /// Query counters.
        stats: PollStats,
    },
}

/// Repeats `probe` with a fixed delay until it yields a value.
///
/// `probe` returns `Ok(Some(_))` when done, `Ok(None)` when the thing it
/// waits for is not there yet, and `Err(_)` when the query itself failed.
/// Failures are logged and retried like absence. Cancellation is checked
/// before each query and raced against each sleep; a signal raised before
/// the first query means no query is issued. The last sleep is shortened so
/// one final query lands on the deadline; with a zero deadline exactly one
/// query is issued.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &mut CancelSignal,
    mut probe: F,
) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    let mut stats = PollStats::default();

    loop {
        if cancel.is_cancelled() {
            debug!("Poll cancelled before attempt {}", stats.attempts + 1);
            return PollOutcome::Cancelled { stats };
        }

        stats.attempts += 1;
        match probe(stats.attempts).await {
            Ok(Some(value)) => return PollOutcome::Ready(value),
            Ok(None) => debug!("Attempt {}: not ready", stats.attempts),
            Err(e) => {
                stats.failures += 1;
                warn!(
                    "Attempt {} failed (retryable: {}), will retry: {e}",
                    stats.attempts,
                    e.is_retryable()
                );
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.deadline {
            return PollOutcome::TimedOut { stats, elapsed };
        }

        let wait = policy.interval.min(policy.deadline - elapsed);
        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = cancel.cancelled() => {
                debug!("Poll cancelled during sleep after {} attempt(s)", stats.attempts);
                return PollOutcome::Cancelled { stats };
            }
        }
    }
}

/// Waits for an ordered server to appear in the server list.
pub struct ProvisioningPoller<'a> {
    api: &'a dyn IcsApi,
    policy: PollPolicy,
}

impl<'a> ProvisioningPoller<'a> {
    /// Creates a poller.
    #[must_use]
    pub const fn new(api: &'a dyn IcsApi, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Polls until a server with `service_id` is listed.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Timeout`] if the deadline passes and
    /// [`ProvisionError::Cancelled`] if `cancel` fires first. Transport
    /// errors are retried, never returned.
    pub async fn await_provisioning(
        &self,
        service_id: u64,
        cancel: &mut CancelSignal,
    ) -> Result<Server> {
        info!(
            "Waiting for service ID {service_id} to be provisioned (timeout {}s)",
            self.policy.deadline.as_secs()
        );

        let api = self.api;
        let outcome = poll_until(&self.policy, cancel, move |_| async move {
            api.list_servers()
                .await
                .map(|servers| servers.into_iter().find(|s| s.service_id == service_id))
        })
        .await;

        match outcome {
            PollOutcome::Ready(server) => {
                info!("Server {} provisioned for service ID {service_id}", server.id);
                Ok(server)
            }
            PollOutcome::TimedOut { stats, elapsed } => {
                warn!(
                    "Service ID {service_id} not provisioned after {} attempt(s) ({} failed)",
                    stats.attempts, stats.failures
                );
                Err(ProvisionError::Timeout {
                    service_id,
                    waited: elapsed,
                }
                .into())
            }
            PollOutcome::Cancelled { .. } => Err(ProvisionError::Cancelled { service_id }.into()),
        }
    }
}
