// View model - the polled state of one mounted view
use crate::application::data_channel::{ChannelError, ChannelLease, DataChannel};
use crate::application::layout_policy::{self, initial_slot};
use crate::application::reconciler;
use crate::application::retry::RetryPolicy;
use crate::application::scheduler::{PollingScheduler, SchedulerError, SchedulerStats};
use crate::domain::sample::{TelemetrySample, ViewKind};
use crate::domain::view_state::ViewState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What a single poll did to the view.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Applied(TelemetrySample),
    /// The backend had nothing to report yet.
    NoData,
    /// The view was unmounted before the response arrived.
    Discarded,
}

pub struct ViewModel {
    kind: ViewKind,
    channel: Arc<dyn DataChannel>,
    state: watch::Sender<ViewState>,
    cancelled: AtomicBool,
    retry: RetryPolicy,
}

impl ViewModel {
    pub fn new(kind: ViewKind, channel: Arc<dyn DataChannel>, retry: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ViewState::new(kind, initial_slot(kind)));
        Self {
            kind,
            channel,
            state,
            cancelled: AtomicBool::new(false),
            retry,
        }
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Marks the view as unmounted. Every later update is dropped.
    pub fn cancel(&self) {
        self.state.send_modify(|state| {
            self.cancelled.store(true, Ordering::SeqCst);
            state.cancelled = true;
        });
    }

    /// Fetch one sample and fold it into the view state.
    pub async fn poll_once(&self) -> Result<PollOutcome, ChannelError> {
        if self.is_cancelled() {
            return Ok(PollOutcome::Discarded);
        }
        let Some(sample) = self.fetch_with_retry().await? else {
            return Ok(PollOutcome::NoData);
        };
        if self.apply(&sample) {
            Ok(PollOutcome::Applied(sample))
        } else {
            tracing::debug!(view = %self.kind, "late sample discarded");
            Ok(PollOutcome::Discarded)
        }
    }

    async fn fetch_with_retry(&self) -> Result<Option<TelemetrySample>, ChannelError> {
        let mut attempt = 0;
        loop {
            match self.channel.fetch_sample(self.kind).await {
                Ok(sample) => return Ok(sample),
                Err(e) if e.is_transient() && self.retry.allows(attempt) && !self.is_cancelled() => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    tracing::debug!(view = %self.kind, attempt, error = %e, "retrying fetch in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reconciles `sample` and refreshes the layout as one published update.
    ///
    /// Returns false when the view was already cancelled or the sample
    /// belongs to another kind.
    pub fn apply(&self, sample: &TelemetrySample) -> bool {
        self.state.send_if_modified(|state| {
            if self.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            let mut next = reconciler::reconcile(state, sample);
            if next.revision == state.revision {
                return false;
            }
            if let Some(plot) = layout_policy::apply_geometry(&next.plot, sample.geometry()) {
                tracing::debug!(view = %self.kind, geometry = ?plot.geometry, "plot layout rebuilt");
                next.plot = plot;
            }
            *state = next;
            true
        })
    }

    fn update(&self, f: impl FnOnce(&ViewState) -> Option<ViewState>) -> bool {
        self.state.send_if_modified(|state| {
            if self.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            match f(state) {
                Some(next) => {
                    *state = next;
                    true
                }
                None => false,
            }
        })
    }

    /// Ask the backend for the available comm ports and union them in.
    pub async fn refresh_ports(&self) -> Result<usize, ChannelError> {
        let ports = self.channel.get_comm_ports().await?;
        self.update(|state| reconciler::merge_comm_ports(state, &ports));
        let state = self.state.borrow();
        tracing::debug!(view = %self.kind, ports = ?state.discovered_ports.as_slice(), "comm ports refreshed");
        Ok(state.discovered_ports.len())
    }

    pub async fn refresh_baud_rates(&self) -> Result<(), ChannelError> {
        let baud_rates = self.channel.get_baud_rates().await?;
        self.update(|state| reconciler::merge_baud_rates(state, &baud_rates));
        Ok(())
    }

    /// Clear plotted data, keeping ports, selection and layout.
    pub fn reset(&self) {
        self.update(|state| Some(state.reset_series()));
    }
}

/// A view that is mounted: its model, timer and channel lease.
pub struct MountedView {
    model: Arc<ViewModel>,
    scheduler: PollingScheduler,
    lease: ChannelLease,
}

impl MountedView {
    /// Starts polling `lease`'s channel for a view of `kind`.
    pub async fn mount(
        kind: ViewKind,
        lease: ChannelLease,
        interval: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, SchedulerError> {
        let model = Arc::new(ViewModel::new(kind, lease.channel(), retry));
        let tick_model = model.clone();
        let started = PollingScheduler::start(format!("view:{}", kind), interval, move || {
            let model = tick_model.clone();
            async move { model.poll_once().await.map(|_| ()) }
        });
        Self::assemble(model, started, lease).await
    }

    /// Wraps an already started scheduler. The lease is released if
    /// `scheduler` failed to start.
    pub async fn assemble(
        model: Arc<ViewModel>,
        scheduler: Result<PollingScheduler, SchedulerError>,
        lease: ChannelLease,
    ) -> Result<Self, SchedulerError> {
        match scheduler {
            Ok(scheduler) => Ok(Self {
                model,
                scheduler,
                lease,
            }),
            Err(e) => {
                model.cancel();
                lease.release().await;
                Err(e)
            }
        }
    }

    pub fn model(&self) -> &Arc<ViewModel> {
        &self.model
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.scheduler.stats()
    }

    /// Cancel, stop polling, then release the channel.
    pub async fn unmount(mut self) {
        self.model.cancel();
        self.scheduler.stop().await;
        let kind = self.model.kind();
        self.lease.release().await;
        tracing::info!(view = %kind, "view unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::data_channel::testing::{MockChannel, MockConnector};
    use crate::application::data_channel::Endpoint;
    use crate::domain::geometry::Orientation;
    use crate::domain::sample::{GeometryFields, IntensitySample, TabularReadings};
    use crate::domain::view_state::ViewSeries;
    use tokio::sync::Notify;

    fn intensity(bins: u32, upward: bool) -> TelemetrySample {
        TelemetrySample::Intensity(IntensitySample {
            geometry: GeometryFields {
                beam_count: Some(4),
                bin_count: Some(bins),
                min_depth: Some(1.0),
                max_depth: Some(21.0),
                is_upward: Some(upward),
            },
            bins: Some((0..bins).map(f64::from).collect()),
            ..Default::default()
        })
    }

    async fn lease(channel: &Arc<MockChannel>) -> ChannelLease {
        let connector = MockConnector::new(channel.clone());
        ChannelLease::acquire(connector.as_ref(), Endpoint::new("127.0.0.1", 4241))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_poll_applies_sample_and_layout_together() {
        let channel = MockChannel::new();
        channel.push_sample(intensity(40, false));
        let model = ViewModel::new(ViewKind::Intensity, channel.clone(), RetryPolicy::none());

        let outcome = model.poll_once().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Applied(_)));

        let state = model.snapshot();
        assert_eq!(state.revision, 1);
        assert_eq!(state.plot.geometry.unwrap().bin_count, 40);
        assert_eq!(
            state.plot.layout.y_axis.as_ref().unwrap().range,
            Some([40.0, 0.0])
        );
    }

    #[tokio::test]
    async fn test_empty_response_changes_nothing() {
        let channel = MockChannel::new();
        let model = ViewModel::new(ViewKind::Tabular, channel.clone(), RetryPolicy::none());

        assert_eq!(model.poll_once().await.unwrap(), PollOutcome::NoData);
        assert_eq!(model.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn test_channel_error_leaves_state_unchanged() {
        let channel = MockChannel::new();
        channel.push_sample(TelemetrySample::Tabular(TabularReadings {
            heading: Some(45.0),
            ..Default::default()
        }));
        channel.push(ViewKind::Tabular, Err(ChannelError::Timeout(2000)));
        let model = ViewModel::new(ViewKind::Tabular, channel.clone(), RetryPolicy::none());

        model.poll_once().await.unwrap();
        assert_eq!(model.poll_once().await, Err(ChannelError::Timeout(2000)));

        let state = model.snapshot();
        assert_eq!(state.revision, 1);
        let ViewSeries::Tabular(readings) = &state.series else {
            panic!("wrong series kind");
        };
        assert_eq!(readings.heading, Some(45.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let channel = MockChannel::new();
        channel.push(ViewKind::Tabular, Err(ChannelError::Transport("reset".into())));
        channel.push_sample(TelemetrySample::Tabular(TabularReadings {
            pitch: Some(2.0),
            ..Default::default()
        }));
        let retry = RetryPolicy::exponential(2, Duration::from_millis(10), Duration::from_millis(40));
        let model = ViewModel::new(ViewKind::Tabular, channel.clone(), retry);

        assert!(matches!(model.poll_once().await, Ok(PollOutcome::Applied(_))));
        assert_eq!(channel.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_late_response_after_unmount_is_discarded() {
        let channel = MockChannel::new();
        channel.push_sample(intensity(30, true));
        let gate = Arc::new(Notify::new());
        channel.gate_fetches(gate.clone());

        let model = Arc::new(ViewModel::new(ViewKind::Intensity, channel.clone(), RetryPolicy::none()));
        let outstanding = tokio::spawn({
            let model = model.clone();
            async move { model.poll_once().await }
        });
        while channel.fetch_count() == 0 {
            tokio::task::yield_now().await;
        }

        model.cancel();
        gate.notify_one();

        let outcome = outstanding.await.unwrap().unwrap();
        assert_eq!(outcome, PollOutcome::Discarded);
        let state = model.snapshot();
        assert_eq!(state.revision, 0);
        assert!(state.cancelled);
        assert!(state.plot.geometry.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mounted_view_polls_and_releases() {
        let channel = MockChannel::new();
        channel.push_sample(intensity(20, false));

        let view = MountedView::mount(
            ViewKind::Intensity,
            lease(&channel).await,
            Duration::from_millis(100),
            RetryPolicy::none(),
        )
        .await
        .unwrap();
        let mut updates = view.model().subscribe();

        updates.changed().await.unwrap();
        assert_eq!(updates.borrow().revision, 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(view.stats().fired() >= 3);

        let model = view.model().clone();
        view.unmount().await;
        let revision = model.snapshot().revision;
        assert!(channel.is_released());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(model.snapshot().revision, revision);
    }

    #[tokio::test]
    async fn test_orientation_flip_between_polls() {
        let channel = MockChannel::new();
        channel.push_sample(intensity(40, false));
        channel.push_sample(intensity(40, true));
        let model = ViewModel::new(ViewKind::Intensity, channel.clone(), RetryPolicy::none());

        model.poll_once().await.unwrap();
        model.poll_once().await.unwrap();

        let layout = model.snapshot().plot.layout;
        assert_eq!(layout.y_axis.unwrap().range, Some([0.0, 40.0]));
        assert_eq!(layout.y_axis2.unwrap().range, Some([1.0, 21.0]));
        assert_eq!(model.snapshot().plot.geometry.unwrap().orientation, Orientation::Upward);
    }
}
