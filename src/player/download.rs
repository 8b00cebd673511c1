use super::net_task::{DownloadProgress, ResourceHandle};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DownloadState {
    #[default]
    Idle,
    Downloading {
        progress: DownloadProgress,
    },
    Ready {
        resource: ResourceHandle,
    },
    Error {
        message: String,
    },
}

impl DownloadState {
    pub fn status(&self) -> &'static str {
        match self {
            DownloadState::Idle => "idle",
            DownloadState::Downloading { .. } => "downloading",
            DownloadState::Ready { .. } => "ready",
            DownloadState::Error { .. } => "error",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DownloadState::Ready { .. })
    }

    pub fn resource(&self) -> Option<&ResourceHandle> {
        match self {
            DownloadState::Ready { resource } => Some(resource),
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<DownloadProgress> {
        match self {
            DownloadState::Downloading { progress } => Some(*progress),
            _ => None,
        }
    }

    /// `"Downloading… N%"`, or the indeterminate variant when the size is
    /// unknown. `None` outside the downloading state.
    pub fn progress_text(&self) -> Option<String> {
        match self.progress()? {
            DownloadProgress::Known(fraction) => {
                Some(format!("Downloading… {}%", (fraction * 100.0).round() as u32))
            }
            DownloadProgress::Unknown => Some("Downloading…".to_string()),
        }
    }

    pub fn error_text(&self) -> Option<String> {
        match self {
            DownloadState::Error { message } => Some(format!("Error downloading: {}", message)),
            _ => None,
        }
    }
}
