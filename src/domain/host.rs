// Messages exchanged with the host shell (windowing, native dialogs)
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "kebab-case")]
pub enum HostMessage {
    /// Ask the host to show a multi-select file dialog.
    OpenFileDialog,
    /// The host's answer to `OpenFileDialog`.
    SelectedDirectory { paths: Vec<PathBuf> },
    /// Ask the host to surface the terminal window.
    ShowAdcpTerminal,
}
