//! Rejection of out-of-domain detector parameters.
use crate::endpoint::{EndpointError, ErrorKind, SimulationEndpoint};
use crate::scenario::ScenarioError;
use crate::status;

/// The detector parameter set to an illegal value by [`check_default_bad_parameter`].
pub const ILLEGAL_FIELD: &str = "frequency_thresh";
/// The illegal value used by [`check_default_bad_parameter`].
pub const ILLEGAL_VALUE: f64 = -0.1;

/// Sets `field` to `value` on a fresh `spike_detector_fuse` and checks that the endpoint rejects
/// it with a `BadParameter` error naming the field. The rejection is returned on success.
pub fn check_bad_parameter<E: SimulationEndpoint + ?Sized>(
    endpoint: &mut E,
    field: &str,
    value: f64,
) -> Result<EndpointError, ScenarioError> {
    let detector = endpoint.create("spike_detector_fuse", 1, &status!())?;
    match endpoint.set_status(&detector, &status! { field => value }) {
        Err(e) if e.kind() == ErrorKind::BadParameter && e.message().contains(field) => {
            log::info!("Successfully raised endpoint error: {}", e);
            Ok(e)
        }
        Err(e) => Err(ScenarioError::Endpoint(e)),
        Ok(()) => Err(ScenarioError::MissingError(format!(
            "The endpoint accepted the illegal value {} for {}",
            value, field
        ))),
    }
}

/// Checks that a negative `frequency_thresh` is rejected.
pub fn check_default_bad_parameter<E: SimulationEndpoint + ?Sized>(
    endpoint: &mut E,
) -> Result<EndpointError, ScenarioError> {
    check_bad_parameter(endpoint, ILLEGAL_FIELD, ILLEGAL_VALUE)
}
