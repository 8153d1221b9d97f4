// Polling scheduler - one repeating timer per mounted view
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Default)]
pub struct SchedulerStats {
    fired: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl SchedulerStats {
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    /// Timer firings dropped because the previous call was still running.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Aborts the wrapped task when dropped.
struct InFlight(JoinHandle<()>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Invokes a tick function every `interval`, with at most one call outstanding.
pub struct PollingScheduler {
    name: String,
    stats: Arc<SchedulerStats>,
    timer: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    pub fn start<F, Fut, E>(
        name: impl Into<String>,
        interval: Duration,
        mut tick: F,
    ) -> Result<Self, SchedulerError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let name = name.into();
        let stats = Arc::new(SchedulerStats::default());
        let timer = tokio::spawn({
            let name = name.clone();
            let stats = stats.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // Dropping this slot (on abort) aborts the outstanding call.
                let mut in_flight: Option<InFlight> = None;

                loop {
                    ticker.tick().await;
                    if in_flight.as_ref().is_some_and(|call| !call.0.is_finished()) {
                        stats.skipped.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(scheduler = %name, "previous call outstanding, tick skipped");
                        continue;
                    }

                    stats.fired.fetch_add(1, Ordering::Relaxed);
                    let call = tick();
                    let name = name.clone();
                    let stats = stats.clone();
                    in_flight = Some(InFlight(tokio::spawn(async move {
                        if let Err(e) = call.await {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(scheduler = %name, error = %e, "poll failed");
                        }
                    })));
                }
            }
        });

        tracing::debug!(scheduler = %name, interval_ms = interval.as_millis() as u64, "polling started");
        Ok(Self {
            name,
            stats,
            timer: Some(timer),
        })
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.stats.clone()
    }

    /// Stops the timer and aborts any outstanding call. No tick starts after
    /// this returns.
    pub async fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            let _ = timer.await;
            tracing::debug!(
                scheduler = %self.name,
                fired = self.stats.fired(),
                skipped = self.stats.skipped(),
                "polling stopped"
            );
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::time::{sleep, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_slow_calls_never_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();

        let mut scheduler = PollingScheduler::start("slow", Duration::from_millis(100), {
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            let started = started.clone();
            move || {
                let in_flight = in_flight.clone();
                let max_in_flight = max_in_flight.clone();
                let started = started.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    started.lock().unwrap().push(Instant::now());
                    sleep(Duration::from_millis(250)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            }
        })
        .unwrap();

        sleep(Duration::from_millis(999)).await;
        scheduler.stop().await;

        let within_second = started
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.duration_since(origin) < Duration::from_secs(1))
            .count();
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert!(within_second <= 4, "{} calls in one second", within_second);
        assert!(within_second >= 3);
        assert!(scheduler.stats().skipped() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollingScheduler::start("fast", Duration::from_millis(10), {
            let count = count.clone();
            move || {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            }
        })
        .unwrap();

        sleep(Duration::from_millis(55)).await;
        scheduler.stop().await;
        let at_stop = count.load(Ordering::SeqCst);
        assert!(at_stop > 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_outstanding_call() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollingScheduler::start("hung", Duration::from_millis(10), {
            let finished = finished.clone();
            move || {
                let finished = finished.clone();
                async move {
                    sleep(Duration::from_secs(5)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            }
        })
        .unwrap();

        sleep(Duration::from_millis(30)).await;
        scheduler.stop().await;
        sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_timer() {
        let mut scheduler = PollingScheduler::start("failing", Duration::from_millis(100), || async {
            Err::<(), _>("backend unavailable")
        })
        .unwrap();

        sleep(Duration::from_millis(350)).await;
        let stats = scheduler.stats();
        scheduler.stop().await;
        assert!(stats.fired() >= 3);
        assert_eq!(stats.failed(), stats.fired());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let result = PollingScheduler::start("zero", Duration::ZERO, || async { Ok::<(), String>(()) });
        assert_eq!(result.err(), Some(SchedulerError::ZeroInterval));
    }
}
