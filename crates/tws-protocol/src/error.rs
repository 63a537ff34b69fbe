//! TinyWebService error types and their wire representation.

use thiserror::Error;

/// Error kinds, each with a stable wire name and HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The listener could not be reached.
    Connect,
    /// The call exceeded its configured duration.
    Timeout,
    /// The target threw while executing the call.
    RemoteExecution,
    /// Path not found, ambiguous or absent method match, unsupported shape.
    Protocol,
    /// Generic member invocation.
    UnsupportedOperation,
    /// Malformed wire text for the expected type.
    Format,
    /// Any other I/O or HTTP failure.
    Transport,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::RemoteExecution => "remote",
            Self::Protocol => "protocol",
            Self::UnsupportedOperation => "unsupported",
            Self::Format => "format",
            Self::Transport => "transport",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(Self::Connect),
            "timeout" => Some(Self::Timeout),
            "remote" => Some(Self::RemoteExecution),
            "protocol" => Some(Self::Protocol),
            "unsupported" => Some(Self::UnsupportedOperation),
            "format" => Some(Self::Format),
            "transport" => Some(Self::Transport),
            _ => None,
        }
    }

    /// HTTP status used when this kind crosses the wire.
    pub fn status(&self) -> u16 {
        match self {
            Self::Protocol | Self::UnsupportedOperation | Self::Format => 400,
            Self::Timeout => 504,
            Self::Connect | Self::Transport => 502,
            Self::RemoteExecution => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every failure a call can surface to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TwsError {
    /// Nothing is listening at the endpoint. Never retried.
    #[error("remote host not found: {0}")]
    Connect(String),

    /// The call did not complete within the configured duration. Never retried.
    #[error("call timed out after {0} ms")]
    Timeout(u64),

    /// The target raised an error; the remote message is preserved.
    #[error("remote error: {message}")]
    RemoteExecution { message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type TwsResult<T> = Result<T, TwsError>;

impl TwsError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteExecution {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub fn path_not_found(member: &str) -> Self {
        Self::Protocol(format!("member '{member}' not found"))
    }

    pub fn instance_not_found(instance_id: &str) -> Self {
        Self::Protocol(format!("instance '{instance_id}' not found"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(_) => ErrorKind::Connect,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RemoteExecution { .. } => ErrorKind::RemoteExecution,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::Format(_) => ErrorKind::Format,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// The bare message, without the kind prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            Self::Connect(m)
            | Self::Protocol(m)
            | Self::UnsupportedOperation(m)
            | Self::Format(m)
            | Self::Transport(m) => m.clone(),
            Self::RemoteExecution { message } => message.clone(),
            Self::Timeout(ms) => ms.to_string(),
        }
    }

    /// Rebuild an error from the kind name and message carried by a failed response.
    pub fn from_wire(kind: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind.and_then(ErrorKind::from_name) {
            Some(ErrorKind::Protocol) => Self::Protocol(message),
            Some(ErrorKind::UnsupportedOperation) => Self::UnsupportedOperation(message),
            Some(ErrorKind::Format) => Self::Format(message),
            Some(ErrorKind::Timeout) => Self::Timeout(message.parse().unwrap_or(0)),
            Some(ErrorKind::Connect) => Self::Connect(message),
            Some(ErrorKind::Transport) => Self::Transport(message),
            Some(ErrorKind::RemoteExecution) | None => Self::RemoteExecution { message },
        }
    }
}
