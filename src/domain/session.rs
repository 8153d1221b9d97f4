// Serial terminal session state machine
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

const ACK: char = '\u{6}';
const NAK: char = '\u{15}';
/// Longest line kept in the log, in bytes. Longer output is wrapped.
pub const MAX_LINE_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
}

impl SessionState {
    pub fn is_linked(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Streaming)
    }
}

/// User intent forwarded to the serial device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    Connect { port: String, baud: u32 },
    Disconnect,
    Break,
    Start,
    Stop,
    Cshow,
    Clear,
    Send { text: String },
    SendBulk { text: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "CONNECT",
            Command::Disconnect => "DISCONNECT",
            Command::Break => "BREAK",
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::Cshow => "CSHOW",
            Command::Clear => "CLEAR",
            Command::Send { .. } => "SEND",
            Command::SendBulk { .. } => "SEND_BULK",
        }
    }

    /// The remote operation that carries this command.
    pub fn remote_request(&self) -> RemoteRequest {
        match self {
            Command::Connect { port, baud } => RemoteRequest::Connect {
                port: port.clone(),
                baud: *baud,
            },
            Command::Disconnect => RemoteRequest::Disconnect,
            Command::Break => RemoteRequest::Break,
            Command::Start => RemoteRequest::Line("START".to_string()),
            Command::Stop => RemoteRequest::Line("STOP".to_string()),
            Command::Cshow => RemoteRequest::Line("CSHOW".to_string()),
            Command::Clear => RemoteRequest::ClearConsole,
            Command::Send { text } => RemoteRequest::Line(text.clone()),
            Command::SendBulk { text } => RemoteRequest::Bulk(text.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    Connect { port: String, baud: u32 },
    Disconnect,
    Break,
    Line(String),
    Bulk(String),
    ClearConsole,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandRejected {
    #[error("{0} rejected: serial port is not connected")]
    NotConnected(&'static str),
    #[error("serial port is already connected")]
    AlreadyConnected,
    #[error("{command} rejected: {pending} is still in progress")]
    Busy {
        command: &'static str,
        pending: &'static str,
    },
    #[error("terminal session is closed")]
    Closed,
}

/// Bounded sequence of terminal lines. The oldest lines are dropped first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingLog {
    lines: VecDeque<String>,
    capacity: usize,
    /// The last line has not been terminated by a newline yet.
    #[serde(skip)]
    open_line: bool,
}

impl RollingLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            open_line: false,
        }
    }

    /// Appends raw terminal text; an unterminated last line is continued by
    /// the next call.
    pub fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let annotated = annotate_control_chars(text);
        let body = annotated.strip_suffix('\n').unwrap_or(&annotated);

        for (i, fragment) in body.split('\n').enumerate() {
            let fragment = fragment.strip_suffix('\r').unwrap_or(fragment);
            self.push_fragment(fragment, i == 0 && self.open_line);
        }
        self.open_line = !annotated.ends_with('\n');
        self.trim();
    }

    /// Adds `fragment` to the open last line (`join`) or as a new line,
    /// wrapping at [`MAX_LINE_LEN`].
    fn push_fragment(&mut self, mut fragment: &str, mut join: bool) {
        loop {
            let room = match self.lines.back() {
                Some(last) if join => MAX_LINE_LEN.saturating_sub(last.len()),
                _ => MAX_LINE_LEN,
            };
            let mut split = room.min(fragment.len());
            while !fragment.is_char_boundary(split) {
                split -= 1;
            }
            let (head, tail) = fragment.split_at(split);
            match self.lines.back_mut() {
                Some(last) if join => last.push_str(head),
                _ => self.lines.push_back(head.to_string()),
            }
            if tail.is_empty() {
                return;
            }
            fragment = tail;
            join = false;
        }
    }

    /// Appends a complete local line (status or error message).
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        self.open_line = false;
        self.trim();
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.open_line = false;
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    fn trim(&mut self) {
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }
}

/// The part of `current` that was not already in `previous`.
///
/// The backend keeps a bounded console and drops its oldest text, so the new
/// buffer may start anywhere inside the previous one.
fn unseen_suffix<'a>(previous: &str, current: &'a str) -> &'a str {
    if let Some(rest) = current.strip_prefix(previous) {
        return rest;
    }
    for (start, _) in previous.char_indices().skip(1) {
        let tail = &previous[start..];
        if let Some(rest) = current.strip_prefix(tail) {
            return rest;
        }
    }
    current
}

/// Makes the device's ACK/NAK bytes readable in the console.
fn annotate_control_chars(text: &str) -> String {
    if !text.contains([ACK, NAK]) {
        return text.to_string();
    }
    text.replace(ACK, "[ACK]").replace(NAK, "[NAK] Bad Command")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialSession {
    state: SessionState,
    selected_port: Option<String>,
    selected_baud: u32,
    pending_command: Option<Command>,
    log: RollingLog,
    /// The backend console buffer as of the previous poll.
    #[serde(skip)]
    console: String,
    closed: bool,
}

impl SerialSession {
    pub fn new(default_baud: u32, log_capacity: usize) -> Self {
        Self {
            state: SessionState::Disconnected,
            selected_port: None,
            selected_baud: default_baud,
            pending_command: None,
            log: RollingLog::new(log_capacity),
            console: String::new(),
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected_port(&self) -> Option<&str> {
        self.selected_port.as_deref()
    }

    pub fn selected_baud(&self) -> u32 {
        self.selected_baud
    }

    pub fn pending_command(&self) -> Option<&Command> {
        self.pending_command.as_ref()
    }

    pub fn log(&self) -> &RollingLog {
        &self.log
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn select_port(&mut self, port: impl Into<String>) {
        self.selected_port = Some(port.into());
    }

    pub fn select_baud(&mut self, baud: u32) {
        self.selected_baud = baud;
    }

    /// Folds the backend's console buffer into the log. Only text that was
    /// not in the previous buffer is appended. Returns whether anything was.
    pub fn sync_console(&mut self, console: &str) -> bool {
        let fresh = unseen_suffix(&self.console, console);
        let appended = !fresh.is_empty();
        if appended {
            self.log.append_text(fresh);
        }
        if self.console != console {
            self.console = console.to_string();
        }
        appended
    }

    /// Validates `command` against the current state and marks it pending.
    ///
    /// On success the caller must issue the returned request and report the
    /// acknowledgement through [`SerialSession::complete`].
    pub fn begin(&mut self, command: &Command) -> Result<RemoteRequest, CommandRejected> {
        if self.closed {
            return Err(CommandRejected::Closed);
        }
        if let Some(pending) = &self.pending_command {
            return Err(CommandRejected::Busy {
                command: command.name(),
                pending: pending.name(),
            });
        }

        match (self.state, command) {
            (SessionState::Disconnected, Command::Connect { port, baud }) => {
                self.state = SessionState::Connecting;
                self.selected_port = Some(port.clone());
                self.selected_baud = *baud;
                self.log
                    .push_line(format!("Serial Connect: {} : {}", port, baud));
            }
            (SessionState::Disconnected, other) => {
                return Err(CommandRejected::NotConnected(other.name()));
            }
            (SessionState::Connecting, other) => {
                return Err(CommandRejected::Busy {
                    command: other.name(),
                    pending: "CONNECT",
                });
            }
            (_, Command::Connect { .. }) => return Err(CommandRejected::AlreadyConnected),
            (_, Command::Clear) => {
                self.log.clear();
                self.console.clear();
            }
            _ => {}
        }

        self.pending_command = Some(command.clone());
        Ok(command.remote_request())
    }

    /// Applies the channel acknowledgement for the pending `command`.
    pub fn complete(&mut self, command: &Command, ack: Result<(), String>) -> SessionState {
        self.pending_command = None;
        if self.closed {
            return self.state;
        }

        match (command, ack) {
            (Command::Connect { .. }, Ok(())) => self.state = SessionState::Connected,
            (Command::Connect { .. }, Err(e)) => {
                self.state = SessionState::Disconnected;
                self.log.push_line(format!("Error opening serial port. {}", e));
            }
            (Command::Disconnect, ack) => {
                self.state = SessionState::Disconnected;
                if let Err(e) = ack {
                    self.log.push_line(format!("Error closing serial port. {}", e));
                }
                self.log.push_line("Serial Disconnect.");
            }
            (Command::Start, Ok(())) => self.state = SessionState::Streaming,
            (Command::Stop, Ok(())) => self.state = SessionState::Connected,
            (other, Err(e)) => {
                self.log
                    .push_line(format!("Error sending {}. {}", other.name(), e));
            }
            _ => {}
        }
        self.state
    }

    /// Terminal transition on view unmount. Returns true when a serial link
    /// was open and should be torn down on the backend.
    pub fn close(&mut self) -> bool {
        let was_linked = self.state.is_linked();
        self.state = SessionState::Disconnected;
        self.pending_command = None;
        self.closed = true;
        was_linked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect() -> Command {
        Command::Connect {
            port: "COM3".to_string(),
            baud: 115200,
        }
    }

    fn connected_session() -> SerialSession {
        let mut session = SerialSession::new(115200, 100);
        session.begin(&connect()).unwrap();
        session.complete(&connect(), Ok(()));
        session
    }

    #[test]
    fn test_connect_handshake() {
        let mut session = SerialSession::new(115200, 100);
        let request = session.begin(&connect()).unwrap();
        assert_eq!(
            request,
            RemoteRequest::Connect {
                port: "COM3".to_string(),
                baud: 115200
            }
        );
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.selected_port(), Some("COM3"));

        assert_eq!(session.complete(&connect(), Ok(())), SessionState::Connected);
        assert!(session.pending_command().is_none());
    }

    #[test]
    fn test_connect_failure_surfaces_error() {
        let mut session = SerialSession::new(115200, 100);
        session.begin(&connect()).unwrap();
        let state = session.complete(&connect(), Err("port busy".to_string()));
        assert_eq!(state, SessionState::Disconnected);
        assert!(session.log().lines().any(|l| l.contains("port busy")));
    }

    #[test]
    fn test_commands_rejected_while_disconnected() {
        let mut session = SerialSession::new(115200, 100);
        for command in [
            Command::Start,
            Command::Stop,
            Command::Break,
            Command::Cshow,
            Command::Clear,
            Command::Disconnect,
            Command::Send {
                text: "CSHOW".to_string(),
            },
        ] {
            assert_eq!(
                session.begin(&command),
                Err(CommandRejected::NotConnected(command.name()))
            );
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.pending_command().is_none());
    }

    #[test]
    fn test_commands_rejected_while_connecting() {
        let mut session = SerialSession::new(115200, 100);
        session.begin(&connect()).unwrap();
        assert!(matches!(
            session.begin(&Command::Start),
            Err(CommandRejected::Busy { .. })
        ));
    }

    #[test]
    fn test_start_stop_cycle() {
        let mut session = connected_session();
        assert_eq!(
            session.begin(&Command::Start).unwrap(),
            RemoteRequest::Line("START".to_string())
        );
        assert_eq!(session.complete(&Command::Start, Ok(())), SessionState::Streaming);

        session.begin(&Command::Cshow).unwrap();
        assert_eq!(session.complete(&Command::Cshow, Ok(())), SessionState::Streaming);

        session.begin(&Command::Stop).unwrap();
        assert_eq!(session.complete(&Command::Stop, Ok(())), SessionState::Connected);
    }

    #[test]
    fn test_failed_start_keeps_state() {
        let mut session = connected_session();
        session.begin(&Command::Start).unwrap();
        let state = session.complete(&Command::Start, Err("timeout".to_string()));
        assert_eq!(state, SessionState::Connected);
    }

    #[test]
    fn test_disconnect_preserves_log() {
        let mut session = connected_session();
        session.sync_console("ADCP ready\r\n");
        session.begin(&Command::Disconnect).unwrap();
        assert_eq!(
            session.complete(&Command::Disconnect, Ok(())),
            SessionState::Disconnected
        );
        assert!(session.log().lines().any(|l| l == "ADCP ready"));
    }

    #[test]
    fn test_clear_empties_log() {
        let mut session = connected_session();
        session.sync_console("line 1\nline 2\n");
        session.begin(&Command::Clear).unwrap();
        session.complete(&Command::Clear, Ok(()));
        assert_eq!(session.log().len(), 0);
    }

    #[test]
    fn test_second_connect_rejected() {
        let mut session = connected_session();
        assert_eq!(
            session.begin(&connect()),
            Err(CommandRejected::AlreadyConnected)
        );
    }

    #[test]
    fn test_close_is_terminal() {
        let mut session = connected_session();
        assert!(session.close());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.begin(&connect()), Err(CommandRejected::Closed));
    }

    #[test]
    fn test_rolling_log_is_bounded() {
        let mut log = RollingLog::new(3);
        for i in 0..10 {
            log.push_line(format!("line {}", i));
        }
        assert_eq!(log.len(), 3);
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines, vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn test_rolling_log_joins_partial_lines() {
        let mut log = RollingLog::new(10);
        log.append_text("Ensemble 1");
        log.append_text("2 received\r\nnext");
        log.append_text(" line\n");
        log.append_text("after\n");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines, vec!["Ensemble 12 received", "next line", "after"]);
    }

    #[test]
    fn test_rolling_log_annotates_ack_and_nak() {
        let mut log = RollingLog::new(10);
        log.append_text("CWPP 1\u{6}\n");
        log.append_text("BOGUS\u{15}\n");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines, vec!["CWPP 1[ACK]", "BOGUS[NAK] Bad Command"]);
    }

    #[test]
    fn test_console_sync_appends_only_new_text() {
        let mut session = SerialSession::new(115200, 100);
        assert!(session.sync_console("ADCP ready\r\n"));
        assert!(!session.sync_console("ADCP ready\r\n"));
        assert!(session.sync_console("ADCP ready\r\nCSHOW\r\n"));
        let lines: Vec<&str> = session.log().lines().collect();
        assert_eq!(lines, vec!["ADCP ready", "CSHOW"]);
    }

    #[test]
    fn test_console_sync_follows_trimmed_buffer() {
        let mut session = SerialSession::new(115200, 100);
        session.sync_console("one\ntwo\n");
        session.sync_console("two\nthree\n");
        let lines: Vec<&str> = session.log().lines().collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_console_sync_after_clear_takes_whole_buffer() {
        let mut session = connected_session();
        session.sync_console("old\n");
        session.begin(&Command::Clear).unwrap();
        session.complete(&Command::Clear, Ok(()));
        session.sync_console("old\n");
        let lines: Vec<&str> = session.log().lines().collect();
        assert_eq!(lines, vec!["old"]);
    }

    #[test]
    fn test_unterminated_output_is_wrapped() {
        let mut log = RollingLog::new(3);
        for _ in 0..100_000 {
            log.append_text("0123456789abcdef\u{7f}");
        }
        assert!(log.len() <= 3);
        assert!(log.lines().all(|line| line.len() <= MAX_LINE_LEN));
        assert!(log.lines().map(str::len).sum::<usize>() <= 3 * MAX_LINE_LEN);
    }

    #[test]
    fn test_selection_and_pending_command() {
        let mut session = SerialSession::new(115200, 10);
        assert_eq!(session.selected_port(), None);
        session.select_port("COM7");
        session.select_baud(9600);
        assert_eq!(session.selected_port(), Some("COM7"));
        assert_eq!(session.selected_baud(), 9600);

        session.begin(&connect()).unwrap();
        assert_eq!(session.pending_command(), Some(&connect()));
        session.complete(&connect(), Ok(()));
        assert_eq!(session.pending_command(), None);
    }
}
