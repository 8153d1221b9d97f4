// Remote data channel - the boundary to the instrument backend
use crate::domain::sample::{
    ContourSample, IntensitySample, ShipTrackSample, TabularReadings, TelemetrySample,
    TerminalSample, TimeSeriesSample, ViewKind,
};
use crate::domain::session::RemoteRequest;
use crate::domain::timeseries::TimeSeriesOptions;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend reported an error: {0}")]
    Remote(String),
    #[error("malformed payload: {0}")]
    Decode(String),
    #[error("channel has been released")]
    Released,
    #[error("request timed out after {0} ms")]
    Timeout(u64),
}

impl ChannelError {
    /// Errors worth another attempt on the same tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Transport(_) | ChannelError::Timeout(_))
    }
}

/// Backend address a channel is opened against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Request/response operations exposed by the backend.
///
/// Sample getters return `Ok(None)` while the backend has no data yet.
/// Command operations return `Ok(())` once the backend acknowledged them.
#[async_trait]
pub trait DataChannel: Send + Sync {
    async fn get_comm_ports(&self) -> Result<Vec<String>, ChannelError>;

    async fn get_baud_rates(&self) -> Result<Vec<u32>, ChannelError>;

    async fn get_tabular_sample(&self) -> Result<Option<TabularReadings>, ChannelError>;

    async fn get_intensity_sample(&self) -> Result<Option<IntensitySample>, ChannelError>;

    async fn get_contour_sample(&self) -> Result<Option<ContourSample>, ChannelError>;

    async fn get_shiptrack_sample(&self) -> Result<Option<ShipTrackSample>, ChannelError>;

    async fn get_timeseries_sample(&self) -> Result<Option<TimeSeriesSample>, ChannelError>;

    async fn get_terminal_sample(&self) -> Result<Option<TerminalSample>, ChannelError>;

    async fn connect_serial(&self, port: &str, baud: u32) -> Result<(), ChannelError>;

    async fn disconnect_serial(&self) -> Result<(), ChannelError>;

    async fn send_break(&self) -> Result<(), ChannelError>;

    async fn send_command(&self, text: &str) -> Result<(), ChannelError>;

    async fn send_bulk(&self, text: &str) -> Result<(), ChannelError>;

    async fn clear_console(&self) -> Result<(), ChannelError>;

    async fn set_timeseries_options(&self, options: &TimeSeriesOptions)
        -> Result<(), ChannelError>;

    async fn get_timeseries_options(&self) -> Result<Option<TimeSeriesOptions>, ChannelError>;

    async fn playback_files(&self, paths: &[PathBuf]) -> Result<(), ChannelError>;

    async fn reset_plots(&self) -> Result<(), ChannelError>;

    /// Closes the underlying connection. Later calls fail with `Released`.
    async fn release(&self);

    /// Fetch the sample backing a view of `kind`.
    async fn fetch_sample(&self, kind: ViewKind) -> Result<Option<TelemetrySample>, ChannelError> {
        let sample = match kind {
            ViewKind::Tabular => self.get_tabular_sample().await?.map(TelemetrySample::Tabular),
            ViewKind::Intensity => self
                .get_intensity_sample()
                .await?
                .map(TelemetrySample::Intensity),
            ViewKind::Contour => self.get_contour_sample().await?.map(TelemetrySample::Contour),
            ViewKind::ShipTrack => self
                .get_shiptrack_sample()
                .await?
                .map(TelemetrySample::ShipTrack),
            ViewKind::TimeSeries => self
                .get_timeseries_sample()
                .await?
                .map(TelemetrySample::TimeSeries),
            ViewKind::Terminal => self
                .get_terminal_sample()
                .await?
                .map(TelemetrySample::Terminal),
        };
        Ok(sample)
    }

    /// Issue a terminal request and wait for its acknowledgement.
    async fn dispatch(&self, request: &RemoteRequest) -> Result<(), ChannelError> {
        match request {
            RemoteRequest::Connect { port, baud } => self.connect_serial(port, *baud).await,
            RemoteRequest::Disconnect => self.disconnect_serial().await,
            RemoteRequest::Break => self.send_break().await,
            RemoteRequest::Line(text) => self.send_command(text).await,
            RemoteRequest::Bulk(text) => self.send_bulk(text).await,
            RemoteRequest::ClearConsole => self.clear_console().await,
        }
    }
}

/// Opens data channels against a backend endpoint.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn DataChannel>, ChannelError>;
}

/// A channel owned by exactly one view (or one scoped operation).
///
/// Must be handed back with [`ChannelLease::release`]; dropping it unreleased
/// is reported as a leak.
pub struct ChannelLease {
    endpoint: Endpoint,
    channel: Arc<dyn DataChannel>,
    released: bool,
}

impl ChannelLease {
    pub async fn acquire(
        connector: &dyn ChannelConnector,
        endpoint: Endpoint,
    ) -> Result<Self, ChannelError> {
        let channel = connector.connect(&endpoint).await?;
        tracing::debug!(endpoint = %endpoint, "channel acquired");
        Ok(Self {
            endpoint,
            channel,
            released: false,
        })
    }

    pub fn channel(&self) -> Arc<dyn DataChannel> {
        self.channel.clone()
    }

    pub async fn release(mut self) {
        self.released = true;
        self.channel.release().await;
        tracing::debug!(endpoint = %self.endpoint, "channel released");
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(endpoint = %self.endpoint, "channel lease dropped without release");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MockChannel, MockConnector};
    use super::*;
    use crate::domain::sample::TerminalSample;

    #[tokio::test]
    async fn test_fetch_sample_dispatches_by_kind() {
        let channel = MockChannel::new();
        channel.push_sample(TelemetrySample::Terminal(TerminalSample {
            is_connected: Some(true),
            ..Default::default()
        }));

        let sample = channel.fetch_sample(ViewKind::Terminal).await.unwrap();
        assert_eq!(sample.map(|s| s.kind()), Some(ViewKind::Terminal));
        assert!(channel.fetch_sample(ViewKind::Contour).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_maps_requests_to_operations() {
        let channel = MockChannel::new();
        channel
            .dispatch(&RemoteRequest::Line("CSHOW".to_string()))
            .await
            .unwrap();
        channel.dispatch(&RemoteRequest::ClearConsole).await.unwrap();
        assert_eq!(channel.calls(), vec!["send_command CSHOW", "clear_console"]);
    }

    #[tokio::test]
    async fn test_lease_release_closes_channel() {
        let channel = MockChannel::new();
        let connector = MockConnector::new(channel.clone());

        let lease = ChannelLease::acquire(connector.as_ref(), Endpoint::new("127.0.0.1", 4241))
            .await
            .unwrap();
        lease.release().await;

        assert!(channel.is_released());
        assert_eq!(
            channel.get_comm_ports().await,
            Err(ChannelError::Released)
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(ChannelError::Timeout(2000).is_transient());
        assert!(ChannelError::Transport("refused".into()).is_transient());
        assert!(!ChannelError::Remote("bad".into()).is_transient());
        assert!(!ChannelError::Released.is_transient());
    }
}
