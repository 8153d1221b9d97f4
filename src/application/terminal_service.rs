// Terminal service - serial session bound to the terminal view
use crate::application::data_channel::{ChannelError, ChannelLease, DataChannel};
use crate::application::retry::RetryPolicy;
use crate::application::scheduler::{PollingScheduler, SchedulerError};
use crate::application::view_model::{MountedView, PollOutcome, ViewModel};
use crate::domain::sample::{TelemetrySample, ViewKind};
use crate::domain::session::{Command, CommandRejected, SerialSession, SessionState};
use crate::domain::view_state::ViewState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] CommandRejected),
    #[error("serial command failed: {0}")]
    Channel(#[from] ChannelError),
}

#[derive(Debug, Clone, Copy)]
pub struct TerminalSettings {
    pub interval: Duration,
    pub default_baud: u32,
    pub log_capacity: usize,
}

/// Serial session plus the terminal view it lives in.
pub struct TerminalSession {
    model: Arc<ViewModel>,
    channel: Arc<dyn DataChannel>,
    session: Mutex<SerialSession>,
    /// Held for the whole request/ack round trip; later commands queue here.
    dispatch: tokio::sync::Mutex<()>,
}

impl TerminalSession {
    /// Mounts the terminal view: fetches the port and baud lists, then polls
    /// terminal output into the rolling log.
    pub async fn mount(
        lease: ChannelLease,
        settings: TerminalSettings,
        retry: RetryPolicy,
    ) -> Result<(Arc<TerminalSession>, MountedView), SchedulerError> {
        let channel = lease.channel();
        let model = Arc::new(ViewModel::new(ViewKind::Terminal, channel.clone(), retry));
        let terminal = Arc::new(TerminalSession {
            model: model.clone(),
            channel,
            session: Mutex::new(SerialSession::new(settings.default_baud, settings.log_capacity)),
            dispatch: tokio::sync::Mutex::new(()),
        });

        if let Err(e) = model.refresh_baud_rates().await {
            tracing::warn!(error = %e, "could not load baud rates");
        }
        if let Err(e) = terminal.rescan_ports().await {
            tracing::warn!(error = %e, "could not list comm ports");
        } else if model.snapshot().discovered_ports.is_empty() {
            tracing::warn!("backend reported no comm ports");
        }

        let poller = terminal.clone();
        let scheduler = PollingScheduler::start("view:terminal", settings.interval, move || {
            let terminal = poller.clone();
            async move { terminal.poll().await }
        });
        let view = MountedView::assemble(model, scheduler, lease).await?;
        tracing::info!("terminal mounted");
        Ok((terminal, view))
    }

    fn lock(&self) -> MutexGuard<'_, SerialSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll(&self) -> Result<(), ChannelError> {
        if let PollOutcome::Applied(TelemetrySample::Terminal(sample)) = self.model.poll_once().await? {
            if let Some(console) = sample.text.as_deref() {
                let mut session = self.lock();
                if !session.is_closed() && session.sync_console(console) {
                    let log = session.log();
                    tracing::trace!(
                        lines = log.len(),
                        last = log.lines().last().unwrap_or_default(),
                        "terminal output received"
                    );
                }
            }
        }
        Ok(())
    }

    /// Validate `command` locally, send it, and apply the acknowledgement.
    ///
    /// Commands are issued one at a time in arrival order.
    pub async fn execute(&self, command: Command) -> Result<SessionState, SessionError> {
        let _turn = self.dispatch.lock().await;

        let request = self.lock().begin(&command)?;
        tracing::info!(command = command.name(), "sending terminal command");
        let ack = self.channel.dispatch(&request).await;

        let state = self
            .lock()
            .complete(&command, ack.as_ref().map(|_| ()).map_err(ToString::to_string));
        match ack {
            Ok(()) => Ok(state),
            Err(e) => {
                tracing::warn!(command = command.name(), error = %e, "terminal command failed");
                Err(e.into())
            }
        }
    }

    pub fn select(&self, port: Option<String>, baud: Option<u32>) {
        let mut session = self.lock();
        if let Some(port) = port {
            session.select_port(port);
        }
        if let Some(baud) = baud {
            session.select_baud(baud);
        }
    }

    /// Union the backend's current comm-port list into the discovered set.
    pub async fn rescan_ports(&self) -> Result<usize, ChannelError> {
        self.model.refresh_ports().await
    }

    pub fn session(&self) -> SerialSession {
        self.lock().clone()
    }

    pub fn view(&self) -> ViewState {
        self.model.snapshot()
    }

    /// Ends the session ahead of unmount; drops an open serial link on a
    /// best-effort basis.
    pub async fn close(&self) {
        let was_linked = {
            let mut session = self.lock();
            if let Some(pending) = session.pending_command() {
                tracing::debug!(command = pending.name(), "closing with a command in flight");
            }
            tracing::info!(state = ?session.state(), "terminal session closing");
            session.close()
        };
        if was_linked {
            if let Err(e) = self.channel.disconnect_serial().await {
                tracing::warn!(error = %e, "serial disconnect on unmount failed");
            }
        }
    }
}
