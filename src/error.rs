use crate::handler::ActionKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera subsystem error: {0}")]
    Subsystem(#[from] SubsystemError),

    #[error("Unsupported camera action: {action}")]
    UnsupportedAction { action: ActionKind },

    #[error("Session context is missing {field} while handling {action}")]
    MissingSessionContext {
        field: &'static str,
        action: ActionKind,
    },

    #[error("No camera device has ever been assigned index {index}")]
    UnknownCameraIndex { index: usize },

    #[error("Invalid camera settings: {details}")]
    InvalidSettings { details: String },

    #[error("Camera handler thread has stopped")]
    HandlerStopped,

    #[error("Dispatch thread has stopped")]
    DispatchStopped,

    #[error("Dispatch queue is full ({capacity} pending jobs)")]
    DispatchQueueFull { capacity: usize },

    #[error("Timed out after {timeout:?} waiting for {job}")]
    Timeout { job: String, timeout: Duration },

    #[error("System error: {message}")]
    System { message: String },
}

impl AgentError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn invalid_settings<S: Into<String>>(details: S) -> Self {
        Self::InvalidSettings {
            details: details.into(),
        }
    }

    pub(crate) fn missing(field: &'static str, action: ActionKind) -> Self {
        Self::MissingSessionContext { field, action }
    }

    /// Runtime-category failures: a broken contract with the hardware layer or
    /// an action the handler cannot process. These are never recovered locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::UnsupportedAction { .. } | AgentError::MissingSessionContext { .. }
        )
    }
}

/// Failures reported by the camera subsystem collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubsystemError {
    #[error("camera {id} is disabled by policy")]
    Disabled { id: String },

    #[error("camera {id} is disconnected")]
    Disconnected { id: String },

    #[error("camera {id} is in use")]
    InUse { id: String },

    #[error("camera device error: {details}")]
    Device { details: String },

    #[error("capture session is closed")]
    SessionClosed,
}

impl SubsystemError {
    pub fn device<S: Into<String>>(details: S) -> Self {
        Self::Device {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AgentError::UnsupportedAction {
            action: ActionKind::CapturePhoto
        }
        .is_fatal());
        assert!(AgentError::missing("capture session", ActionKind::StartPreview).is_fatal());

        assert!(!AgentError::from(SubsystemError::SessionClosed).is_fatal());
        assert!(!AgentError::UnknownCameraIndex { index: 7 }.is_fatal());
        assert!(!AgentError::HandlerStopped.is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = AgentError::from(SubsystemError::Disconnected {
            id: "1".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Camera subsystem error: camera 1 is disconnected"
        );

        let err = AgentError::UnsupportedAction {
            action: ActionKind::SetDisplayOrientation,
        };
        assert!(err.to_string().contains("set_display_orientation"));
    }
}
