//! Error types for the scenario module.
use std::fmt;

use crate::endpoint::EndpointError;
use crate::redirect::RedirectError;

/// Error types for the scenarios.
#[derive(Debug, PartialEq)]
pub enum ScenarioError {
    /// An endpoint error the scenario did not expect, passed on unchanged.
    Endpoint(EndpointError),
    /// The output of the endpoint could not be redirected.
    Redirect(RedirectError),
    /// The endpoint behaved against the expectation of the scenario.
    Assertion(String),
    /// An expected error was not raised.
    MissingError(String),
    /// Error for I/O operations, e.g., while reading a configuration file.
    Io(String),
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScenarioError::Endpoint(e) => write!(f, "{}", e),
            ScenarioError::Redirect(e) => write!(f, "Redirection failed: {}", e),
            ScenarioError::Assertion(e) => write!(f, "Test FAILED. {}", e),
            ScenarioError::MissingError(e) => write!(f, "Test FAILED. {}", e),
            ScenarioError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::Endpoint(e) => Some(e),
            ScenarioError::Redirect(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EndpointError> for ScenarioError {
    fn from(e: EndpointError) -> Self {
        ScenarioError::Endpoint(e)
    }
}

impl From<RedirectError> for ScenarioError {
    fn from(e: RedirectError) -> Self {
        ScenarioError::Redirect(e)
    }
}

impl From<std::io::Error> for ScenarioError {
    fn from(e: std::io::Error) -> Self {
        ScenarioError::Io(e.to_string())
    }
}
