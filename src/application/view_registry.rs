// View registry - mounts, unmounts and resets views
use crate::application::data_channel::{ChannelConnector, ChannelError, ChannelLease, Endpoint};
use crate::application::retry::RetryPolicy;
use crate::application::scheduler::SchedulerError;
use crate::application::terminal_service::{TerminalSession, TerminalSettings};
use crate::application::view_model::MountedView;
use crate::domain::sample::{TelemetrySample, TimeSeriesSample, ViewKind};
use crate::domain::timeseries::{TimeSeriesChannel, TimeSeriesOptions};
use crate::domain::view_state::{ViewSeries, ViewState};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} view is not mounted")]
    NotMounted(ViewKind),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSettings {
    pub endpoint: Endpoint,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Endpoint for operations not tied to a view (playback, options).
    pub control_endpoint: Endpoint,
    pub default_interval: Duration,
    pub views: HashMap<ViewKind, ViewSettings>,
    pub terminal: TerminalSettings,
    pub retry: RetryPolicy,
}

impl RegistrySettings {
    pub fn view(&self, kind: ViewKind) -> ViewSettings {
        if let Some(settings) = self.views.get(&kind) {
            return settings.clone();
        }
        let interval = match kind {
            ViewKind::Terminal => self.terminal.interval,
            _ => self.default_interval,
        };
        ViewSettings {
            endpoint: self.control_endpoint.clone(),
            interval,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountedSummary {
    pub kind: ViewKind,
    pub revision: u64,
    pub polls: u64,
    pub skipped: u64,
    pub failed: u64,
}

enum Mounted {
    View(MountedView),
    Terminal {
        session: Arc<TerminalSession>,
        view: MountedView,
    },
}

impl Mounted {
    fn view(&self) -> &MountedView {
        match self {
            Mounted::View(view) => view,
            Mounted::Terminal { view, .. } => view,
        }
    }

    async fn unmount(self) {
        match self {
            Mounted::View(view) => view.unmount().await,
            Mounted::Terminal { session, view } => {
                session.close().await;
                view.unmount().await;
            }
        }
    }
}

pub struct ViewRegistry {
    connector: Arc<dyn ChannelConnector>,
    settings: RegistrySettings,
    mounted: Mutex<HashMap<ViewKind, Mounted>>,
}

impl ViewRegistry {
    pub fn new(connector: Arc<dyn ChannelConnector>, settings: RegistrySettings) -> Self {
        Self {
            connector,
            settings,
            mounted: Mutex::new(HashMap::new()),
        }
    }

    /// Mounts a view of `kind`. Returns false if it was already mounted.
    ///
    /// The channel is opened without holding the registry lock. If another
    /// caller mounted the same kind meanwhile, the new view is torn down.
    pub async fn mount(&self, kind: ViewKind) -> Result<bool, RegistryError> {
        if self.mounted.lock().await.contains_key(&kind) {
            return Ok(false);
        }

        let settings = self.settings.view(kind);
        let lease = ChannelLease::acquire(self.connector.as_ref(), settings.endpoint.clone()).await?;
        let entry = match kind {
            ViewKind::Terminal => {
                let terminal = TerminalSettings {
                    interval: settings.interval,
                    ..self.settings.terminal
                };
                let (session, view) =
                    TerminalSession::mount(lease, terminal, self.settings.retry).await?;
                Mounted::Terminal { session, view }
            }
            _ => Mounted::View(
                MountedView::mount(kind, lease, settings.interval, self.settings.retry).await?,
            ),
        };
        let mut mounted = self.mounted.lock().await;
        if mounted.contains_key(&kind) {
            drop(mounted);
            tracing::debug!(view = %kind, "view mounted concurrently, dropping duplicate");
            entry.unmount().await;
            return Ok(false);
        }
        mounted.insert(kind, entry);
        drop(mounted);

        tracing::info!(
            view = %kind,
            endpoint = %settings.endpoint,
            interval_ms = settings.interval.as_millis() as u64,
            "view mounted"
        );
        Ok(true)
    }

    pub async fn unmount(&self, kind: ViewKind) -> Result<(), RegistryError> {
        let entry = self
            .mounted
            .lock()
            .await
            .remove(&kind)
            .ok_or(RegistryError::NotMounted(kind))?;
        entry.unmount().await;
        Ok(())
    }

    pub async fn snapshot(&self, kind: ViewKind) -> Result<ViewState, RegistryError> {
        let mounted = self.mounted.lock().await;
        let entry = mounted.get(&kind).ok_or(RegistryError::NotMounted(kind))?;
        Ok(entry.view().model().snapshot())
    }

    pub async fn subscribe(&self, kind: ViewKind) -> Result<watch::Receiver<ViewState>, RegistryError> {
        let mounted = self.mounted.lock().await;
        let entry = mounted.get(&kind).ok_or(RegistryError::NotMounted(kind))?;
        Ok(entry.view().model().subscribe())
    }

    pub async fn mounted(&self) -> Vec<MountedSummary> {
        let mounted = self.mounted.lock().await;
        let mut summaries: Vec<MountedSummary> = mounted
            .iter()
            .map(|(kind, entry)| {
                let stats = entry.view().stats();
                MountedSummary {
                    kind: *kind,
                    revision: entry.view().model().snapshot().revision,
                    polls: stats.fired(),
                    skipped: stats.skipped(),
                    failed: stats.failed(),
                }
            })
            .collect();
        summaries.sort_by_key(|summary| summary.kind);
        summaries
    }

    pub async fn terminal(&self) -> Result<Arc<TerminalSession>, RegistryError> {
        match self.mounted.lock().await.get(&ViewKind::Terminal) {
            Some(Mounted::Terminal { session, .. }) => Ok(session.clone()),
            _ => Err(RegistryError::NotMounted(ViewKind::Terminal)),
        }
    }

    /// Clears plotted data in every mounted view.
    pub async fn reset_all(&self) {
        let mounted = self.mounted.lock().await;
        for entry in mounted.values() {
            entry.view().model().reset();
        }
        tracing::debug!(views = mounted.len(), "views reset");
    }

    async fn control_lease(&self) -> Result<ChannelLease, RegistryError> {
        let endpoint = self.settings.control_endpoint.clone();
        Ok(ChannelLease::acquire(self.connector.as_ref(), endpoint).await?)
    }

    /// Starts playback of recorded ensemble files and clears the views.
    pub async fn playback(&self, paths: &[PathBuf]) -> Result<(), RegistryError> {
        let lease = self.control_lease().await?;
        let result = lease.channel().playback_files(paths).await;
        lease.release().await;
        result?;

        tracing::info!(files = paths.len(), "playback requested");
        self.reset_all().await;
        Ok(())
    }

    pub async fn reset_plots(&self) -> Result<(), RegistryError> {
        let lease = self.control_lease().await?;
        let result = lease.channel().reset_plots().await;
        lease.release().await;
        result?;

        self.reset_all().await;
        Ok(())
    }

    pub async fn set_timeseries_options(
        &self,
        options: &TimeSeriesOptions,
    ) -> Result<(), RegistryError> {
        let lease = self.control_lease().await?;
        let result = lease.channel().set_timeseries_options(options).await;
        lease.release().await;
        result?;

        if let Some(entry) = self.mounted.lock().await.get(&ViewKind::TimeSeries) {
            let sample = TimeSeriesSample {
                selected: TimeSeriesChannel::ALL
                    .into_iter()
                    .map(|channel| (channel, options.is_selected(channel)))
                    .collect(),
                max_ens: Some(options.max_ens),
                ..Default::default()
            };
            entry.view().model().apply(&TelemetrySample::TimeSeries(sample));
        }
        Ok(())
    }

    /// The backend's options, falling back to the mounted view's selection.
    pub async fn timeseries_options(&self) -> Result<TimeSeriesOptions, RegistryError> {
        let lease = self.control_lease().await?;
        let result = lease.channel().get_timeseries_options().await;
        lease.release().await;
        if let Some(options) = result? {
            return Ok(options);
        }

        let local = self.snapshot(ViewKind::TimeSeries).await.ok();
        Ok(match local.map(|state| state.series) {
            Some(ViewSeries::TimeSeries(series)) => TimeSeriesOptions {
                selected: series.selected,
                max_ens: series.max_ens,
            },
            _ => TimeSeriesOptions::default(),
        })
    }

    /// Unmounts every view.
    pub async fn shutdown(&self) {
        let drained: Vec<Mounted> = self.mounted.lock().await.drain().map(|(_, v)| v).collect();
        for entry in drained {
            entry.unmount().await;
        }
        tracing::info!("all views unmounted");
    }
}
