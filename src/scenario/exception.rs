//! Propagation of errors raised by a node during a simulation.
use crate::endpoint::{EndpointError, ErrorKind, SimulationEndpoint};
use crate::scenario::ScenarioError;
use crate::status;

/// Duration (in ms) of the simulation expected to fail.
pub const SIM_TIME: f64 = 10.0;

/// Resets the endpoint, creates `n_nodes` exception test nodes on `virtual_procs` virtual
/// processes and checks that simulating raises a `TestException`, which is returned.
pub fn check_exception_propagation<E: SimulationEndpoint + ?Sized>(
    endpoint: &mut E,
    virtual_procs: usize,
    n_nodes: usize,
) -> Result<EndpointError, ScenarioError> {
    endpoint.reset()?;
    endpoint.set_kernel_status(&status! { "total_num_virtual_procs" => virtual_procs })?;
    endpoint.create("throw_exception_node", n_nodes, &status!())?;

    match endpoint.simulate(SIM_TIME) {
        Err(e) if e.kind() == ErrorKind::TestException => {
            log::info!(
                "Exception propagated with {} virtual process(es): {}",
                virtual_procs,
                e
            );
            Ok(e)
        }
        Err(e) => Err(ScenarioError::Endpoint(e)),
        Ok(()) => Err(ScenarioError::MissingError(
            "The exception was not thrown".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::kernel::LocalKernel;
    use crate::endpoint::models::EXCEPTION_TEST_MODULE;

    #[test]
    fn test_single_threaded() {
        let mut kernel = LocalKernel::new();
        kernel.install(EXCEPTION_TEST_MODULE).unwrap();
        let e = check_exception_propagation(&mut kernel, 1, 1).unwrap();
        assert!(e.to_string().contains("TestException"));
    }

    #[test]
    fn test_multi_threaded() {
        let mut kernel = LocalKernel::new();
        kernel.install(EXCEPTION_TEST_MODULE).unwrap();
        check_exception_propagation(&mut kernel, 1, 1).unwrap();
        check_exception_propagation(&mut kernel, 12, 10).unwrap();
    }

    #[test]
    fn test_module_missing() {
        let mut kernel = LocalKernel::new();
        assert!(matches!(
            check_exception_propagation(&mut kernel, 1, 1),
            Err(ScenarioError::Endpoint(EndpointError::UnknownModelName(_)))
        ));
    }
}
