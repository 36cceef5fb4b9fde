//! Test scenarios driving a simulation endpoint.
//!
//! Each scenario performs a handful of endpoint calls and checks that the expected errors, and
//! only those, are raised:
//!
//! - [`validation`]: out-of-domain detector parameters are rejected
//! - [`sweep`]: the fuse detector trips exactly when the input rate exceeds its threshold
//! - [`exception`]: errors raised during a simulation reach the caller
//!
//! Unexpected endpoint errors are never swallowed, they are returned as
//! [`ScenarioError::Endpoint`].
pub mod error;
pub mod exception;
pub mod sweep;
pub mod validation;

pub use error::ScenarioError;
