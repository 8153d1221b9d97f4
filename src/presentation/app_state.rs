// Application state for HTTP handlers
use crate::application::host_bridge::HostBridge;
use crate::application::view_registry::ViewRegistry;
use crate::domain::host::HostMessage;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ViewRegistry>,
    pub host: HostBridge,
    /// Outbound side of the host channel; held by the attached host shell.
    pub host_events: Arc<Mutex<mpsc::Receiver<HostMessage>>>,
}
