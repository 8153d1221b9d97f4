// HTTP data channel - JSON RPC envelope over reqwest
use crate::application::data_channel::{ChannelConnector, ChannelError, DataChannel, Endpoint};
use crate::domain::sample::{
    ContourSample, IntensitySample, ShipTrackSample, TabularReadings, TerminalSample,
    TimeSeriesSample,
};
use crate::domain::timeseries::TimeSeriesOptions;
use crate::infrastructure::payload;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reply to every RPC call.
#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

impl RpcEnvelope {
    /// Error only: the call failed. A result wins over an accompanying error.
    fn into_result(self, operation: &str) -> Result<Option<Value>, ChannelError> {
        match (self.error, self.result) {
            (Some(error), None) => Err(ChannelError::Remote(error)),
            (error, result) => {
                if let Some(error) = error {
                    tracing::warn!(operation, error = %error, "backend returned data with an error");
                }
                Ok(result.filter(|value| !payload::is_empty(value)))
            }
        }
    }
}

#[derive(Debug)]
pub struct HttpDataChannel {
    endpoint: Endpoint,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    released: AtomicBool,
}

impl HttpDataChannel {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: format!("http://{}", endpoint),
            endpoint,
            client,
            timeout,
            released: AtomicBool::new(false),
        })
    }

    async fn invoke(&self, operation: &str, args: Value) -> Result<Option<Value>, ChannelError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(ChannelError::Released);
        }

        let url = format!("{}/rpc/{}", self.base_url, operation);
        let response = self
            .client
            .post(&url)
            .json(&args)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Transport(format!(
                "{} returned {}: {}",
                operation, status, body
            )));
        }

        let envelope: RpcEnvelope = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                ChannelError::Decode(format!("{}: {}", operation, e))
            }
        })?;
        tracing::trace!(operation, endpoint = %self.endpoint, "rpc completed");
        envelope.into_result(operation)
    }

    fn transport_error(&self, e: reqwest::Error) -> ChannelError {
        if e.is_timeout() {
            ChannelError::Timeout(self.timeout.as_millis() as u64)
        } else {
            ChannelError::Transport(e.to_string())
        }
    }

    async fn sample<T>(
        &self,
        operation: &str,
        args: Value,
        map: fn(Value) -> Result<T, ChannelError>,
    ) -> Result<Option<T>, ChannelError> {
        self.invoke(operation, args).await?.map(map).transpose()
    }

    async fn ack(&self, operation: &str, args: Value) -> Result<(), ChannelError> {
        self.invoke(operation, args).await.map(|_| ())
    }
}

#[async_trait]
impl DataChannel for HttpDataChannel {
    async fn get_comm_ports(&self) -> Result<Vec<String>, ChannelError> {
        let ports = self
            .sample("get_comm_ports", json!([]), payload::comm_ports_from_payload)
            .await?;
        Ok(ports.unwrap_or_default())
    }

    async fn get_baud_rates(&self) -> Result<Vec<u32>, ChannelError> {
        let bauds = self
            .sample("get_baud_rates", json!([]), payload::baud_rates_from_payload)
            .await?;
        Ok(bauds.unwrap_or_default())
    }

    async fn get_tabular_sample(&self) -> Result<Option<TabularReadings>, ChannelError> {
        self.sample("get_tabular_sample", json!([0]), payload::tabular_from_payload)
            .await
    }

    async fn get_intensity_sample(&self) -> Result<Option<IntensitySample>, ChannelError> {
        self.sample("get_intensity_sample", json!([0]), payload::intensity_from_payload)
            .await
    }

    async fn get_contour_sample(&self) -> Result<Option<ContourSample>, ChannelError> {
        self.sample("get_contour_sample", json!(["mag"]), payload::contour_from_payload)
            .await
    }

    async fn get_shiptrack_sample(&self) -> Result<Option<ShipTrackSample>, ChannelError> {
        self.sample("get_shiptrack_sample", json!([0]), payload::ship_track_from_payload)
            .await
    }

    async fn get_timeseries_sample(&self) -> Result<Option<TimeSeriesSample>, ChannelError> {
        self.sample("get_timeseries_sample", json!([]), payload::time_series_from_payload)
            .await
    }

    async fn get_terminal_sample(&self) -> Result<Option<TerminalSample>, ChannelError> {
        self.sample("get_terminal_sample", json!([]), payload::terminal_from_payload)
            .await
    }

    async fn connect_serial(&self, port: &str, baud: u32) -> Result<(), ChannelError> {
        self.ack("connect_serial", json!([port, baud])).await
    }

    async fn disconnect_serial(&self) -> Result<(), ChannelError> {
        self.ack("disconnect_serial", json!([])).await
    }

    async fn send_break(&self) -> Result<(), ChannelError> {
        self.ack("send_break", json!([])).await
    }

    async fn send_command(&self, text: &str) -> Result<(), ChannelError> {
        self.ack("send_command", json!([text])).await
    }

    async fn send_bulk(&self, text: &str) -> Result<(), ChannelError> {
        self.ack("send_bulk", json!([text])).await
    }

    async fn clear_console(&self) -> Result<(), ChannelError> {
        self.ack("clear_console", json!([])).await
    }

    async fn set_timeseries_options(
        &self,
        options: &TimeSeriesOptions,
    ) -> Result<(), ChannelError> {
        self.ack("set_timeseries_options", payload::options_to_args(options))
            .await
    }

    async fn get_timeseries_options(&self) -> Result<Option<TimeSeriesOptions>, ChannelError> {
        self.sample("get_timeseries_options", json!([]), payload::options_from_payload)
            .await
    }

    async fn playback_files(&self, paths: &[PathBuf]) -> Result<(), ChannelError> {
        let files: Vec<String> = paths
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        self.ack("playback_files", json!([files])).await
    }

    async fn reset_plots(&self) -> Result<(), ChannelError> {
        self.ack("reset_plots", json!([0])).await
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Opens one HTTP channel per lease.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ChannelConnector for HttpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn DataChannel>, ChannelError> {
        Ok(Arc::new(HttpDataChannel::new(endpoint.clone(), self.timeout)?))
    }
}
