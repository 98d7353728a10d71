//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Bounded waits on operational state.
//!
//! A watch samples one path until a predicate holds or a deadline expires.
//! Push subscriptions are used when the collaborator offers them; otherwise
//! the path is polled with an exponential backoff. In both cases the wait is
//! bounded by the deadline: an in-flight request still pending at the
//! deadline is abandoned.
//!
//! Timeouts are not errors. A watch that times out returns an unsatisfied
//! [`WatchResult`] carrying the last observed value, and the caller decides
//! whether that is a test failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conform_utils::task::Task;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::time::{self, Instant};

use crate::config::HarnessConfig;
use crate::debug::Debug;
use crate::device::{Sample, SampleStream, Telemetry};
use crate::error::{Error, Result};
use crate::path::ObservablePath;
use crate::verify::{FailureKind, VerificationError};

// Roughly 30 years, the deadline of a wait with an unbounded timeout.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Polling interval bounds. The interval starts at `min` and doubles after
/// every sample until it reaches `max`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchResult<T> {
    // Last decoded sample, `None` if the path was absent or never sampled.
    pub value: Option<T>,
    pub satisfied: bool,
    pub samples: usize,
}

/// Waits for predicates over the operational state of one collaborator.
#[derive(Clone)]
pub struct StateWatcher {
    source: Arc<dyn Telemetry>,
    backoff: Backoff,
}

enum Sampler {
    Poll { interval: Duration, first: bool },
    Subscription(SampleStream),
}

// ===== impl Backoff =====

impl Backoff {
    // Lower bound of the polling interval.
    pub const FLOOR: Duration = Duration::from_millis(10);

    pub fn new(min: Duration, max: Duration) -> Backoff {
        let min = min.max(Backoff::FLOOR);
        let max = max.max(min);
        Backoff { min, max }
    }
}

impl Default for Backoff {
    fn default() -> Backoff {
        Backoff::from(&HarnessConfig::default())
    }
}

impl From<&HarnessConfig> for Backoff {
    fn from(config: &HarnessConfig) -> Backoff {
        Backoff::new(config.poll_interval_min, config.poll_interval_max)
    }
}

// ===== impl WatchResult =====

impl<T> WatchResult<T> {
    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Converts an unsatisfied result into a timeout failure naming the
    /// path, the timeout and the last observed value.
    pub fn verify(
        &self,
        path: &ObservablePath,
        timeout: Duration,
        expectation: &str,
    ) -> std::result::Result<(), VerificationError>
    where
        T: std::fmt::Debug,
    {
        if self.satisfied {
            return Ok(());
        }
        let last = match &self.value {
            Some(value) => format!("{value:?}"),
            None => "absent".to_owned(),
        };
        Err(VerificationError::new(
            FailureKind::Timeout,
            format!(
                "{path}: {expectation} not observed within {timeout:?} (last value: {last})"
            ),
        ))
    }
}

// ===== impl StateWatcher =====

impl StateWatcher {
    pub fn new(source: Arc<dyn Telemetry>, backoff: Backoff) -> StateWatcher {
        StateWatcher { source, backoff }
    }

    pub fn source(&self) -> &Arc<dyn Telemetry> {
        &self.source
    }

    /// Reads a path once.
    pub async fn get<T>(&self, path: &ObservablePath) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let sample = self.source.get(path).await?;
        decode(path, sample)
    }

    /// Waits until `predicate` holds for the value of `path`, or until
    /// `timeout` elapses. The predicate receives `None` while the path is
    /// absent.
    pub async fn watch<T, F>(
        &self,
        path: &ObservablePath,
        timeout: Duration,
        predicate: F,
    ) -> Result<WatchResult<T>>
    where
        T: DeserializeOwned,
        F: Fn(Option<&T>) -> bool,
    {
        validate_timeout(path, timeout)?;
        let deadline = deadline_after(Instant::now(), timeout);
        self.watch_until(path, timeout, deadline, None, &predicate)
            .await
    }

    /// Like [`StateWatcher::watch`], but the predicate must keep holding for
    /// `hold` before the watch is satisfied. Any sample violating the
    /// predicate restarts the hold period.
    pub async fn watch_stable<T, F>(
        &self,
        path: &ObservablePath,
        timeout: Duration,
        hold: Duration,
        predicate: F,
    ) -> Result<WatchResult<T>>
    where
        T: DeserializeOwned,
        F: Fn(Option<&T>) -> bool,
    {
        validate_timeout(path, timeout)?;
        let deadline = deadline_after(Instant::now(), timeout);
        self.watch_until(path, timeout, deadline, Some(hold), &predicate)
            .await
    }

    /// Watches several paths concurrently against a shared deadline, one
    /// task per path. Results are keyed by path.
    ///
    /// The first fatal error aborts the remaining watches.
    pub async fn watch_all<T, F>(
        &self,
        paths: impl IntoIterator<Item = ObservablePath>,
        timeout: Duration,
        predicate: F,
    ) -> Result<HashMap<ObservablePath, WatchResult<T>>>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Option<&T>) -> bool + Send + Sync + 'static,
    {
        let paths = paths.into_iter().collect::<Vec<_>>();
        for path in &paths {
            validate_timeout(path, timeout)?;
        }

        let deadline = deadline_after(Instant::now(), timeout);
        let predicate = Arc::new(predicate);
        let tasks = paths
            .into_iter()
            .map(|path| {
                let watcher = self.clone();
                let predicate = predicate.clone();
                let task_path = path.clone();
                let task = Task::spawn(async move {
                    watcher
                        .watch_until(
                            &task_path,
                            timeout,
                            deadline,
                            None,
                            &*predicate,
                        )
                        .await
                });
                (path, task)
            })
            .collect::<Vec<_>>();

        let mut results = HashMap::with_capacity(tasks.len());
        for (path, task) in tasks {
            let result = task.await.map_err(Error::TaskJoin)??;
            results.insert(path, result);
        }
        Ok(results)
    }

    async fn watch_until<T, F>(
        &self,
        path: &ObservablePath,
        timeout: Duration,
        deadline: Instant,
        hold: Option<Duration>,
        predicate: &F,
    ) -> Result<WatchResult<T>>
    where
        T: DeserializeOwned,
        F: Fn(Option<&T>) -> bool,
    {
        let start = Instant::now();

        // A subscription request that doesn't complete in time falls back to
        // polling, which still samples the path once.
        let mut sampler =
            match time::timeout_at(deadline, self.source.subscribe(path)).await
            {
                Ok(result) => match result? {
                    Some(stream) => Sampler::Subscription(stream),
                    None => Sampler::poll(&self.backoff),
                },
                Err(_) => Sampler::poll(&self.backoff),
            };
        Debug::WatchStart(path, timeout, sampler.mode()).log();

        let mut last: Sample = None;
        let mut value = None;
        let mut samples = 0;
        // Instant since which the predicate has held without interruption.
        let mut streak: Option<Instant> = None;
        loop {
            let wake = match (hold, streak) {
                (Some(hold), Some(since)) => {
                    deadline_after(since, hold).min(deadline)
                }
                _ => deadline,
            };
            let next = sampler
                .next(&*self.source, path, &self.backoff, wake, deadline)
                .await?;
            if let Some(sample) = next {
                samples += 1;
                value = decode::<T>(path, sample.clone())?;
                last = sample;
                if !predicate(value.as_ref()) {
                    streak = None;
                } else if streak.is_none() {
                    streak = Some(Instant::now());
                }
            }

            let now = Instant::now();
            if let Some(since) = streak {
                if hold.is_none_or(|hold| now >= deadline_after(since, hold)) {
                    Debug::WatchSatisfied(path, now - start, samples).log();
                    return Ok(WatchResult {
                        value,
                        satisfied: true,
                        samples,
                    });
                }
            }
            if now >= deadline {
                Debug::WatchTimeout(path, timeout, last.as_ref()).log();
                return Ok(WatchResult {
                    value,
                    satisfied: false,
                    samples,
                });
            }
        }
    }
}

impl std::fmt::Debug for StateWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateWatcher")
            .field("source", &self.source.name())
            .field("backoff", &self.backoff)
            .finish()
    }
}

// ===== impl Sampler =====

impl Sampler {
    fn poll(backoff: &Backoff) -> Sampler {
        Sampler::Poll {
            interval: backoff.min,
            first: true,
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            Sampler::Poll { .. } => "poll",
            Sampler::Subscription(_) => "subscription",
        }
    }

    // Returns the next sample, or `None` if nothing was observed before
    // `wake`.
    async fn next(
        &mut self,
        source: &dyn Telemetry,
        path: &ObservablePath,
        backoff: &Backoff,
        wake: Instant,
        deadline: Instant,
    ) -> Result<Option<Sample>> {
        match self {
            Sampler::Poll { interval, first } => {
                if *first {
                    *first = false;
                } else {
                    let next_poll = deadline_after(Instant::now(), *interval);
                    time::sleep_until(next_poll.min(wake)).await;
                    *interval = interval.saturating_mul(2).min(backoff.max);
                }
                match time::timeout_at(deadline, source.get(path)).await {
                    Ok(sample) => Ok(Some(sample?)),
                    Err(_) => Ok(None),
                }
            }
            Sampler::Subscription(stream) => {
                match time::timeout_at(wake, stream.next()).await {
                    Ok(Some(Ok(sample))) => Ok(Some(sample)),
                    Ok(Some(Err(error))) => Err(error.into()),
                    Ok(None) => Err(Error::SubscriptionClosed(path.clone())),
                    Err(_) => Ok(None),
                }
            }
        }
    }
}

// ===== helper functions =====

fn validate_timeout(path: &ObservablePath, timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::InvalidTimeout(path.clone(), timeout));
    }
    Ok(())
}

// Instant `duration` after `start`, clamped to a far-future instant when the
// sum would overflow.
fn deadline_after(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

fn decode<T>(path: &ObservablePath, sample: Sample) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    sample
        .map(serde_json::from_value)
        .transpose()
        .map_err(|error| Error::Decode(path.clone(), error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_bounds() {
        let backoff = Backoff::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(backoff.min, Backoff::FLOOR);
        assert_eq!(backoff.max, Backoff::FLOOR);

        let backoff =
            Backoff::new(Duration::from_millis(500), Duration::from_secs(5));
        assert_eq!(backoff.min, Duration::from_millis(500));
        assert_eq!(backoff.max, Duration::from_secs(5));
    }

    #[test]
    fn deadline_saturates() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_secs(5)),
            now + Duration::from_secs(5)
        );
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[test]
    fn unsatisfied_result_names_last_value() {
        let path = ObservablePath::flow_in_pkts("flow-a");
        let result = WatchResult {
            value: Some(42u64),
            satisfied: false,
            samples: 3,
        };
        let error = result
            .verify(&path, Duration::from_secs(5), "at least 100 packets")
            .unwrap_err();
        assert_eq!(error.kind, FailureKind::Timeout);
        assert!(error.description.contains("flow[name=flow-a]"));
        assert!(error.description.contains("5s"));
        assert!(error.description.contains("last value: 42"));

        let absent = WatchResult::<u64> {
            value: None,
            satisfied: false,
            samples: 1,
        };
        let error = absent
            .verify(&path, Duration::from_secs(5), "presence")
            .unwrap_err();
        assert!(error.description.contains("last value: absent"));
    }
}
