//! Waiter - Poll a remote object until it settles in a target status
//!
//! Mutating cloud calls return before the change is done. The waiter
//! probes the object repeatedly and classifies each reported status:
//!
//! - a **target** status ends the wait successfully
//! - a **pending** status keeps waiting
//! - anything else fails immediately as an unexpected status
//!
//! A probe that reports not-found ends the wait successfully only when the
//! configured absent status is itself a target (deletion waits). Elapsed
//! time, not the number of probes, bounds the wait: sleeps are clamped to
//! the deadline and a probe still running at the deadline is abandoned.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::{Instant, sleep_until, timeout_at};

use crate::provider::ProviderError;
use crate::timeouts::{DEFAULT_TIMEOUT, MAX_TIMEOUT};

/// Default delay before the first probe
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Default pause between two probes
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(3);

/// Status reported for a deleted object
pub const STATUS_DELETED: &str = "DELETED";

/// One probe result: an opaque snapshot and the status it reports
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    pub snapshot: T,
    pub status: String,
}

impl<T> Observation<T> {
    pub fn new(snapshot: T, status: impl Into<String>) -> Self {
        Self {
            snapshot,
            status: status.into(),
        }
    }
}

/// Successful end of a wait
#[derive(Debug, Clone, PartialEq)]
pub struct Settled<T> {
    /// Last snapshot, `None` when the object turned out to be absent
    pub snapshot: Option<T>,
    /// Terminal status (synthetic when the object is absent)
    pub status: String,
    /// Number of probes issued
    pub probes: u32,
    pub elapsed: Duration,
}

/// Why a wait failed
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error(
        "waiting for {subject} to become {}: timeout after {} (last status: {})",
        target.join("|"),
        humantime::format_duration(*timeout),
        last_status.as_deref().unwrap_or("none")
    )]
    Timeout {
        subject: String,
        target: Vec<String>,
        timeout: Duration,
        last_status: Option<String>,
    },

    #[error("unexpected status '{status}' for {subject}, expected one of: {}", expected.join(", "))]
    UnexpectedStatus {
        subject: String,
        status: String,
        expected: Vec<String>,
    },

    #[error("{subject} disappeared while waiting to become {}", target.join("|"))]
    NotFound {
        subject: String,
        target: Vec<String>,
        #[source]
        source: ProviderError,
    },

    #[error("error waiting for {subject}: {source}")]
    Probe {
        subject: String,
        #[source]
        source: ProviderError,
    },
}

impl WaitError {
    pub fn subject(&self) -> &str {
        match self {
            WaitError::Timeout { subject, .. }
            | WaitError::UnexpectedStatus { subject, .. }
            | WaitError::NotFound { subject, .. }
            | WaitError::Probe { subject, .. } => subject,
        }
    }

    /// Last status seen before the failure, where one is known
    pub fn last_status(&self) -> Option<&str> {
        match self {
            WaitError::Timeout { last_status, .. } => last_status.as_deref(),
            WaitError::UnexpectedStatus { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// Parameters of a single wait
///
/// Built once per mutating call and not shared between waits.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Human-readable description of the polled object, used in errors
    pub subject: String,
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Pause before the first probe
    pub delay: Duration,
    /// Pause between probes
    pub min_interval: Duration,
    /// Status to report when the probe says the object does not exist
    pub absent_status: Option<String>,
    /// Consecutive target observations needed before succeeding
    pub continuous_target_occurrence: u32,
}

impl WaitConfig {
    pub fn new<P, T>(subject: impl Into<String>, pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            subject: subject.into(),
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_TIMEOUT,
            delay: DEFAULT_DELAY,
            min_interval: DEFAULT_MIN_INTERVAL,
            absent_status: None,
            continuous_target_occurrence: 1,
        }
    }

    /// Wait for an object to disappear
    ///
    /// Targets `DELETED`, which is also what a not-found probe reports.
    pub fn deletion<P>(subject: impl Into<String>, pending: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let mut config = Self::new(subject, pending, [STATUS_DELETED]);
        config.absent_status = Some(STATUS_DELETED.to_string());
        config
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn absent_as(mut self, status: impl Into<String>) -> Self {
        self.absent_status = Some(status.into());
        self
    }

    pub fn continuous_target_occurrence(mut self, count: u32) -> Self {
        self.continuous_target_occurrence = count.max(1);
        self
    }

    fn is_target(&self, status: &str) -> bool {
        self.target.iter().any(|t| t == status)
    }

    fn is_pending(&self, status: &str) -> bool {
        self.pending.iter().any(|p| p == status)
    }

    /// Status standing in for absence, if absence counts as reaching the target
    fn absence_target(&self) -> Option<&str> {
        self.absent_status
            .as_deref()
            .filter(|status| self.is_target(status))
    }

    /// Probe until a terminal condition or the deadline
    pub async fn wait_for<T, F, Fut>(&self, mut probe: F) -> Result<Settled<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, ProviderError>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout.min(MAX_TIMEOUT);
        let mut last_status: Option<String> = None;
        let mut probes = 0u32;
        let mut target_seen = 0u32;

        debug!(
            "Waiting for {} to become {} (timeout {})",
            self.subject,
            self.target.join("|"),
            humantime::format_duration(self.timeout)
        );

        if !self.delay.is_zero() {
            sleep_until((start + self.delay.min(MAX_TIMEOUT)).min(deadline)).await;
        }

        loop {
            if Instant::now() >= deadline {
                return Err(self.timed_out(last_status));
            }

            probes += 1;
            let result = match timeout_at(deadline, probe()).await {
                Ok(result) => result,
                Err(_) => return Err(self.timed_out(last_status)),
            };

            match result {
                Ok(observation) => {
                    debug!(
                        "{} current status: {} (probe {})",
                        self.subject, observation.status, probes
                    );

                    if self.is_target(&observation.status) {
                        target_seen += 1;
                        if target_seen >= self.continuous_target_occurrence {
                            return Ok(Settled {
                                snapshot: Some(observation.snapshot),
                                status: observation.status,
                                probes,
                                elapsed: start.elapsed(),
                            });
                        }
                    } else if self.is_pending(&observation.status) {
                        target_seen = 0;
                    } else {
                        let mut expected = self.pending.clone();
                        expected.extend(self.target.iter().cloned());
                        warn!(
                            "{} reported unexpected status {}",
                            self.subject, observation.status
                        );
                        return Err(WaitError::UnexpectedStatus {
                            subject: self.subject.clone(),
                            status: observation.status,
                            expected,
                        });
                    }

                    last_status = Some(observation.status);
                }
                Err(err) if err.is_not_found() => {
                    return match self.absence_target() {
                        Some(status) => {
                            debug!("{} no longer exists, treating as {}", self.subject, status);
                            Ok(Settled {
                                snapshot: None,
                                status: status.to_string(),
                                probes,
                                elapsed: start.elapsed(),
                            })
                        }
                        None => {
                            warn!("{} disappeared while waiting", self.subject);
                            Err(WaitError::NotFound {
                                subject: self.subject.clone(),
                                target: self.target.clone(),
                                source: err,
                            })
                        }
                    };
                }
                Err(err) => {
                    warn!("Probing {} failed: {}", self.subject, err);
                    return Err(WaitError::Probe {
                        subject: self.subject.clone(),
                        source: err,
                    });
                }
            }

            sleep_until((Instant::now() + self.min_interval.min(MAX_TIMEOUT)).min(deadline)).await;
        }
    }

    fn timed_out(&self, last_status: Option<String>) -> WaitError {
        warn!(
            "Timed out after {} waiting for {}",
            humantime::format_duration(self.timeout),
            self.subject
        );
        WaitError::Timeout {
            subject: self.subject.clone(),
            target: self.target.clone(),
            timeout: self.timeout,
            last_status,
        }
    }
}
