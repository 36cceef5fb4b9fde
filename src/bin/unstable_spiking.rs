//! Checks that the fuse detector rejects illegal parameters and trips exactly when the input rate
//! exceeds its frequency threshold.
use std::process::ExitCode;

use env_logger::Env;

use rusty_fuse::endpoint::kernel::LocalKernel;
use rusty_fuse::endpoint::models::FUSE_MODULE;
use rusty_fuse::endpoint::SimulationEndpoint;
use rusty_fuse::scenario::sweep::{run_sweep, Outcome, RunReport, SweepConfig};
use rusty_fuse::scenario::validation::check_default_bad_parameter;
use rusty_fuse::scenario::ScenarioError;
use rusty_fuse::{status, CONFIG_ENV_VAR};

fn print_run(run: &RunReport) {
    println!();
    println!("Run Number    : {}", run.index);
    println!("N_src         : {}", run.params.n_src);
    println!("N_threads     : {}", run.params.n_threads);
    println!("rate          : {}", run.params.rate);
    println!("freq_thresh   : {}", run.params.freq_thresh);
    println!("length_thresh : {}", run.params.length_thresh);
    match run.outcome {
        Outcome::Stable => println!("  STABLE"),
        Outcome::Unstable { time } => println!("  UNSTABLE at {:.4} ms", time),
    }
}

fn run() -> Result<(), ScenarioError> {
    let config = match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) => {
            log::info!("Loading sweep configuration from {:?}", path);
            SweepConfig::load_from(path)?
        }
        None => SweepConfig::default(),
    };

    let mut kernel = LocalKernel::new();
    kernel.install(FUSE_MODULE)?;
    kernel.set_kernel_status(&status! { "total_num_virtual_procs" => 12 })?;
    kernel.create("spike_generator", 1, &status!())?;

    let e = check_default_bad_parameter(&mut kernel)?;
    println!("SUCCESSfull raised following endpoint exception:\n");
    println!("     {}", e);
    println!();

    run_sweep(&mut kernel, &config, print_run)?;
    println!("ALL TESTS PASSED SUCCESSFULLY");
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
