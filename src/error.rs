use thiserror::Error;

/// Failures the theremin loop knows how to recover from (or report).
#[derive(Debug, Error)]
pub enum ThereminError {
    #[error("video source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("failed to read frame from {source_name}: {reason}")]
    FrameReadFailure { source_name: String, reason: String },

    #[error("landmark detector failed: {0}")]
    DetectorFault(String),

    #[error("audio device fault: {0}")]
    AudioDeviceFault(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ThereminError {
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        ThereminError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn frame_read(source_name: impl Into<String>, reason: impl ToString) -> Self {
        ThereminError::FrameReadFailure {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the loop can leave this error behind through a retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ThereminError::SourceUnavailable { .. }
                | ThereminError::FrameReadFailure { .. }
                | ThereminError::DetectorFault(_)
        )
    }
}

pub type Result<T, E = ThereminError> = std::result::Result<T, E>;
