//! Error types for the simulation endpoint.
//!
//! Endpoints report failures as `"<Kind>: <message>"` strings. The tagged variants below are
//! built once, at the boundary, so callers match on the kind instead of re-parsing messages.
use std::fmt;

/// The kind of an endpoint error, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadParameter,
    UnstableSpiking,
    TestException,
    UnknownModelName,
    UnknownNode,
    KernelFused,
    Other,
}

impl ErrorKind {
    /// Returns the name the endpoint uses as message prefix for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadParameter => "BadParameter",
            ErrorKind::UnstableSpiking => "UnstableSpiking",
            ErrorKind::TestException => "TestException",
            ErrorKind::UnknownModelName => "UnknownModelName",
            ErrorKind::UnknownNode => "UnknownNode",
            ErrorKind::KernelFused => "KernelFused",
            ErrorKind::Other => "Other",
        }
    }

    /// Returns the kind with the given prefix name, if it is one of the known kinds.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "BadParameter" => Some(ErrorKind::BadParameter),
            "UnstableSpiking" => Some(ErrorKind::UnstableSpiking),
            "TestException" => Some(ErrorKind::TestException),
            "UnknownModelName" => Some(ErrorKind::UnknownModelName),
            "UnknownNode" => Some(ErrorKind::UnknownNode),
            "KernelFused" => Some(ErrorKind::KernelFused),
            _ => None,
        }
    }
}

/// Error types raised by a simulation endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointError {
    /// A parameter was set outside of its valid domain, or does not exist.
    BadParameter(String),
    /// The fuse detector aborted the simulation because of runaway spiking.
    UnstableSpiking(String),
    /// The exception raised on purpose by the exception test node.
    TestException(String),
    /// The model is neither built in nor provided by an installed module.
    UnknownModelName(String),
    /// A node id does not refer to an existing node.
    UnknownNode(String),
    /// The kernel was aborted by an earlier error and must be reset.
    KernelFused(String),
    /// Any other error, with the kind name reported by the endpoint.
    Other { kind: String, message: String },
}

impl EndpointError {
    /// Classifies a raw `"<Kind>: <message>"` string. Messages without a recognised prefix are
    /// kept whole as [`EndpointError::Other`].
    pub fn parse(raw: &str) -> Self {
        let (name, message) = match raw.split_once(':') {
            Some((name, message)) => (name.trim(), message.trim()),
            None => (raw.trim(), ""),
        };
        match ErrorKind::from_name(name) {
            Some(kind) => EndpointError::with_kind(kind, message),
            None if !name.is_empty() && !name.contains(char::is_whitespace) => {
                EndpointError::Other {
                    kind: name.to_string(),
                    message: message.to_string(),
                }
            }
            None => EndpointError::Other {
                kind: String::new(),
                message: raw.to_string(),
            },
        }
    }

    /// Builds an error of the given kind.
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::BadParameter => EndpointError::BadParameter(message),
            ErrorKind::UnstableSpiking => EndpointError::UnstableSpiking(message),
            ErrorKind::TestException => EndpointError::TestException(message),
            ErrorKind::UnknownModelName => EndpointError::UnknownModelName(message),
            ErrorKind::UnknownNode => EndpointError::UnknownNode(message),
            ErrorKind::KernelFused => EndpointError::KernelFused(message),
            ErrorKind::Other => EndpointError::Other {
                kind: String::new(),
                message,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EndpointError::BadParameter(_) => ErrorKind::BadParameter,
            EndpointError::UnstableSpiking(_) => ErrorKind::UnstableSpiking,
            EndpointError::TestException(_) => ErrorKind::TestException,
            EndpointError::UnknownModelName(_) => ErrorKind::UnknownModelName,
            EndpointError::UnknownNode(_) => ErrorKind::UnknownNode,
            EndpointError::KernelFused(_) => ErrorKind::KernelFused,
            EndpointError::Other { .. } => ErrorKind::Other,
        }
    }

    /// Returns the name prefixing the rendered message.
    pub fn kind_name(&self) -> &str {
        match self {
            EndpointError::Other { kind, .. } => kind,
            _ => self.kind().name(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            EndpointError::BadParameter(m)
            | EndpointError::UnstableSpiking(m)
            | EndpointError::TestException(m)
            | EndpointError::UnknownModelName(m)
            | EndpointError::UnknownNode(m)
            | EndpointError::KernelFused(m) => m,
            EndpointError::Other { message, .. } => message,
        }
    }
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.kind_name(), self.message()) {
            ("", message) => write!(f, "{}", message),
            (kind, "") => write!(f, "{}", kind),
            (kind, message) => write!(f, "{}: {}", kind, message),
        }
    }
}

impl std::error::Error for EndpointError {}

impl From<std::io::Error> for EndpointError {
    fn from(e: std::io::Error) -> Self {
        EndpointError::Other {
            kind: "IOError".to_string(),
            message: e.to_string(),
        }
    }
}
