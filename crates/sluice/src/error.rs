//! Error types for the call pipeline.
//!
//! Transport failures are carried inside [`Error::Transport`]; everything else
//! here is raised while binding, encoding or dispatching a call.

use crate::transport;

#[derive(Debug, Clone)]
pub enum Error {
    /// No target is registered under the requested service name.
    TargetNotFound(String),
    /// The target has no method with the requested signature.
    MethodNotFound { service: String, signature: String },
    /// The call carried the wrong number of arguments.
    ArgumentCount { method: String, expected: usize, found: usize },
    /// Payload or value could not be encoded or decoded.
    Serialization(String),
    /// The proxy cannot serve this method with the invoker it was given.
    UnsupportedSignature { service: &'static str, method: &'static str },
    /// The remote side raised an exception. Displays as the bare message.
    Remote(String),
    Transport(transport::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetNotFound(name) => write!(f, "Target not found: {}", name),
            Self::MethodNotFound { service, signature } => {
                write!(f, "Method not found on {}: signature {}", service, signature)
            }
            Self::ArgumentCount { method, expected, found } => {
                write!(f, "Argument count mismatch for {}: expected {}, got {}", method, expected, found)
            }
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::UnsupportedSignature { service, method } => {
                write!(f, "Unsupported signature {}.{}: synchronous method needs a blocking invoker", service, method)
            }
            Self::Remote(msg) => f.write_str(msg),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
