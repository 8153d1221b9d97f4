// Host bridge - requests to and from the host shell
use crate::application::view_registry::{RegistryError, ViewRegistry};
use crate::domain::host::HostMessage;
use crate::domain::sample::ViewKind;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host shell is not listening")]
    Unavailable,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Routes host-channel messages to the registry and forwards requests meant
/// for the host shell itself.
#[derive(Clone)]
pub struct HostBridge {
    registry: Arc<ViewRegistry>,
    outbound: mpsc::Sender<HostMessage>,
}

impl HostBridge {
    pub fn new(registry: Arc<ViewRegistry>, outbound: mpsc::Sender<HostMessage>) -> Self {
        Self { registry, outbound }
    }

    pub async fn handle(&self, message: HostMessage) -> Result<(), HostError> {
        match message {
            HostMessage::OpenFileDialog => self.forward(HostMessage::OpenFileDialog),
            HostMessage::SelectedDirectory { paths } => {
                if paths.is_empty() {
                    tracing::debug!("file dialog closed without a selection");
                    return Ok(());
                }
                self.registry.playback(&paths).await?;
                Ok(())
            }
            HostMessage::ShowAdcpTerminal => {
                self.registry.mount(ViewKind::Terminal).await?;
                self.forward(HostMessage::ShowAdcpTerminal)
            }
        }
    }

    /// Queues `message` for the host shell. Fails when the shell has stopped
    /// draining its queue.
    fn forward(&self, message: HostMessage) -> Result<(), HostError> {
        tracing::debug!(?message, "forwarding to host shell");
        self.outbound.try_send(message).map_err(|e| {
            tracing::warn!(error = %e, "host shell queue unavailable");
            HostError::Unavailable
        })
    }
}
