//! Error types for vcam

use thiserror::Error;

/// Result type alias using VcamError
pub type Result<T> = std::result::Result<T, VcamError>;

/// Main error type for vcam operations
#[derive(Debug, Error)]
pub enum VcamError {
    /// Bad geometry or frame rate passed at construction
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device identity is held by another live camera
    #[error("creating a virtual camera instance failed")]
    AlreadyInUse(String),

    /// Submitted frame does not match the camera geometry
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Operation on a camera that has been deleted
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The host video subsystem rejected (un)registration
    #[error("Device registration failed: {0}")]
    Registration(String),

    /// No producer has registered the device
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Shared frame buffer is malformed or unreadable
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VcamError>,
    },
}

impl VcamError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid frame error
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// The error every operation returns once the camera is gone
    pub fn deleted() -> Self {
        Self::InvalidState("deleted".to_string())
    }

    /// Create a registration error
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all context layers stripped
    pub fn root(&self) -> &VcamError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Actionable hint for the user, if there is one
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::AlreadyInUse(_) => Some(
                "Another producer owns the virtual camera. Stop it, or check `vcam status`.",
            ),
            Self::InvalidArgument(_) => Some(
                "Width and height must be between 1 and 16384, framerate between 0 and 1000.",
            ),
            Self::DeviceNotFound(_) => {
                Some("No producer is running. Start one with `vcam send`.")
            }
            Self::Registration(_) => Some(
                "Check that the runtime directory is writable (see `runtime_dir` in config.toml).",
            ),
            Self::Config(_) => Some("Check ~/.config/vcam/config.toml, or run `vcam config init`."),
            _ => None,
        }
    }

    /// Whether the user can fix this without code changes
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::InvalidArgument(_)
                | Self::AlreadyInUse(_)
                | Self::DeviceNotFound(_)
                | Self::Registration(_)
                | Self::Config(_)
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
