//! Upstream request governor: minimum spacing plus a cooldown window after rate-limit signals.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

use crate::config::RateConfig;

/// Stand-in for deadlines too far out to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Default)]
struct RateState {
    last_request: Option<Instant>,
    cooldown_until: Option<Instant>,
}

impl RateState {
    /// Earliest instant the next request may go out.
    fn ready_at(&self, min_interval: Duration) -> Option<Instant> {
        let spaced = self.last_request.map(|last| later_by(last, min_interval));
        match (spaced, self.cooldown_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

fn later_by(base: Instant, by: Duration) -> Instant {
    base.checked_add(by)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

/// Snapshot for status reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateStatus {
    pub min_interval: Duration,
    pub cooldown_remaining: Option<Duration>,
}

/// Blocking gate in front of one upstream platform.
///
/// `acquire` callers queue on an async gate so upstream requests go out one at a time.
/// The timing state sits behind a separate short-lived lock: a cooldown armed while
/// callers are queued or sleeping is seen by all of them before they proceed.
#[derive(Debug)]
pub struct RateGovernor {
    cfg: RateConfig,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<RateState>,
}

impl RateGovernor {
    pub fn new(cfg: RateConfig) -> Self {
        Self {
            cfg,
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(RateState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until a request may be issued, then record it.
    pub async fn acquire(&self) {
        let _gate = self.gate.lock().await;
        loop {
            let target = {
                let mut st = self.state();
                let now = Instant::now();
                match st.ready_at(self.cfg.min_interval) {
                    Some(target) if target > now => {
                        if st.cooldown_until.is_some_and(|until| until >= target) {
                            tracing::info!(
                                "rate governor: cooling down for {:.1}s",
                                target.saturating_duration_since(now).as_secs_f64()
                            );
                        }
                        target
                    }
                    _ => {
                        st.last_request = Some(now);
                        return;
                    }
                }
            };
            // Re-check after waking: a cooldown may have been armed meanwhile.
            sleep_until(target).await;
        }
    }

    /// Withhold requests for `duration` from now. Never shortens an active window.
    pub fn trigger_cooldown(&self, duration: Duration) {
        let mut st = self.state();
        let candidate = later_by(Instant::now(), duration);
        let until = match st.cooldown_until {
            Some(current) if current > candidate => current,
            _ => candidate,
        };
        st.cooldown_until = Some(until);
        tracing::warn!(
            "rate limit signalled; cooling down for {}s",
            until.saturating_duration_since(Instant::now()).as_secs()
        );
    }

    pub fn trigger_default_cooldown(&self) {
        self.trigger_cooldown(self.cfg.cooldown);
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.state().cooldown_until
    }

    pub fn status(&self) -> RateStatus {
        let cooldown_remaining = self
            .cooldown_until()
            .map(|until| until.saturating_duration_since(Instant::now()))
            .filter(|d| !d.is_zero());
        RateStatus {
            min_interval: self.cfg.min_interval,
            cooldown_remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn governor(min_interval_secs: u64, cooldown_secs: u64) -> RateGovernor {
        RateGovernor::new(RateConfig {
            min_interval: Duration::from_secs(min_interval_secs),
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_does_not_wait() {
        let gov = governor(8, 600);
        let start = Instant::now();
        gov.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_acquires_respect_min_interval() {
        let gov = governor(8, 600);
        gov.acquire().await;
        let first = Instant::now();
        gov.acquire().await;
        assert!(first.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_once_interval_has_elapsed() {
        let gov = governor(8, 600);
        gov.acquire().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        let start = Instant::now();
        gov.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_for_configured_duration() {
        let gov = governor(0, 600);
        gov.trigger_default_cooldown();
        let start = Instant::now();
        gov.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(600));
        assert!(waited < Duration::from_secs(601));
        assert!(gov.status().cooldown_remaining.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_never_moves_back_in_time() {
        let gov = governor(0, 600);
        gov.trigger_cooldown(Duration::from_secs(600));
        let first = gov.cooldown_until().unwrap();

        gov.trigger_cooldown(Duration::from_secs(10));
        assert_eq!(gov.cooldown_until().unwrap(), first);

        tokio::time::advance(Duration::from_secs(5)).await;
        gov.trigger_cooldown(Duration::from_secs(600));
        assert!(gov.cooldown_until().unwrap() > first);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialized() {
        let gov = Arc::new(governor(8, 600));
        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let gov = gov.clone();
                tokio::spawn(async move {
                    gov.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for h in handles {
            stamps.push(h.await.unwrap());
        }
        stamps.sort();
        assert!(stamps[1] - stamps[0] >= Duration::from_secs(8));
        assert!(stamps[2] - stamps[1] >= Duration::from_secs(8));
        assert!(start.elapsed() >= Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_remaining_cooldown() {
        let gov = governor(8, 600);
        assert_eq!(gov.status().cooldown_remaining, None);
        gov.trigger_default_cooldown();
        let remaining = gov.status().cooldown_remaining.unwrap();
        assert!(remaining > Duration::from_secs(599));
        assert_eq!(gov.status().min_interval, Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_armed_while_callers_queue_delays_all_of_them() {
        let gov = Arc::new(governor(8, 600));
        gov.acquire().await;
        let start = Instant::now();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let gov = gov.clone();
                tokio::spawn(async move {
                    gov.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_secs(1)).await;
        gov.trigger_default_cooldown();

        let mut stamps = Vec::new();
        for h in handles {
            stamps.push(h.await.unwrap());
        }
        stamps.sort();
        assert!(stamps[0] - start >= Duration::from_secs(601));
        assert!(stamps[1] - stamps[0] >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn status_sees_cooldown_while_a_caller_waits_it_out() {
        let gov = Arc::new(governor(0, 600));
        gov.trigger_default_cooldown();

        let waiter = {
            let gov = gov.clone();
            tokio::spawn(async move { gov.acquire().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let remaining = gov.status().cooldown_remaining.unwrap();
        assert!(remaining >= Duration::from_secs(598));
        assert!(remaining <= Duration::from_secs(599));

        waiter.await.unwrap();
        assert_eq!(gov.status().cooldown_remaining, None);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_durations_saturate_instead_of_panicking() {
        let gov = governor(u64::MAX, u64::MAX);
        gov.acquire().await;
        gov.trigger_default_cooldown();
        gov.trigger_cooldown(Duration::MAX);
        assert!(gov.status().cooldown_remaining.unwrap() > Duration::from_secs(86_400));

        let second = tokio::time::timeout(Duration::from_secs(3600), gov.acquire()).await;
        assert!(second.is_err());
    }
}
