//! Checks that an exception raised by a node during a simulation reaches the caller, with one and
//! with several virtual processes.
use std::process::ExitCode;

use env_logger::Env;

use rusty_fuse::endpoint::kernel::LocalKernel;
use rusty_fuse::endpoint::models::EXCEPTION_TEST_MODULE;
use rusty_fuse::endpoint::SimulationEndpoint;
use rusty_fuse::scenario::exception::check_exception_propagation;
use rusty_fuse::scenario::ScenarioError;

fn run() -> Result<(), ScenarioError> {
    let mut kernel = LocalKernel::new();
    kernel.install(EXCEPTION_TEST_MODULE)?;

    check_exception_propagation(&mut kernel, 1, 1)?;
    println!("\nSUCCESS: The Single Threaded Example Passed");

    check_exception_propagation(&mut kernel, 12, 10)?;
    println!("\nSUCCESS: The Multi Threaded Example Passed");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
