//! Stability sweep of the fuse detector.
//!
//! For every combination of the swept parameters, a Poisson generator drives `n_src` parrot
//! neurons which all project onto one `spike_detector_fuse`. The detector must abort the
//! simulation with an `UnstableSpiking` error when the input rate exceeds its frequency threshold,
//! and let it run to the end when the rate stays below.
//!
//! The endpoint output produced while resetting the kernel and while simulating is captured into
//! the dump file of the configuration, truncated at each capture.
//!
//! # Example
//!
//! ```rust
//! use rusty_fuse::scenario::sweep::SweepConfig;
//!
//! let config = SweepConfig::default();
//! assert_eq!(config.num_runs(), 2 * 3 * 3 * 3 * 2);
//!
//! let first = config.runs()[0];
//! assert_eq!((first.n_src, first.n_threads, first.rate), (100, 1, 20.0));
//! ```
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::endpoint::{ConnectionRule, EndpointError, SimulationEndpoint, Value};
use crate::redirect::with_redirected_output;
use crate::scenario::ScenarioError;
use crate::status;

/// Duration (in ms) of each simulation of the sweep.
pub const SIM_TIME: f64 = 500.0;
/// Default file capturing the endpoint output.
pub const DUMP_FILE: &str = "nestdump.txt";

/// The swept parameter values and the settings shared by all runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Numbers of parrot neurons connected to the detector.
    pub n_src: Vec<usize>,
    /// Numbers of virtual processes of the kernel.
    pub n_threads: Vec<usize>,
    /// Rates of the Poisson generator (in Hz).
    pub rate: Vec<f64>,
    /// Frequency thresholds of the detector (in Hz).
    pub freq_thresh: Vec<f64>,
    /// Length thresholds of the detector (in ms).
    pub length_thresh: Vec<f64>,
    /// Duration of each simulation (in ms).
    pub sim_time: f64,
    pub dump_file: PathBuf,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            n_src: vec![100, 800],
            n_threads: vec![1, 4, 12],
            rate: vec![20.0, 60.0, 100.0],
            freq_thresh: vec![20.0, 60.0, 100.0],
            length_thresh: vec![100.0, 200.0],
            sim_time: SIM_TIME,
            dump_file: PathBuf::from(DUMP_FILE),
        }
    }
}

impl SweepConfig {
    /// Returns the parameters of every run, i.e., the cartesian product of the swept values.
    /// The last parameter varies fastest.
    pub fn runs(&self) -> Vec<RunParameters> {
        iproduct!(
            self.n_src.iter(),
            self.n_threads.iter(),
            self.rate.iter(),
            self.freq_thresh.iter(),
            self.length_thresh.iter()
        )
        .map(
            |(&n_src, &n_threads, &rate, &freq_thresh, &length_thresh)| RunParameters {
                n_src,
                n_threads,
                rate,
                freq_thresh,
                length_thresh,
            },
        )
        .collect()
    }

    pub fn num_runs(&self) -> usize {
        self.n_src.len()
            * self.n_threads.len()
            * self.rate.len()
            * self.freq_thresh.len()
            * self.length_thresh.len()
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Loads a configuration from a JSON file. Missing fields take their default value.
    pub fn load_from<P: AsRef<Path>>(path: P) -> std::io::Result<SweepConfig> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// The parameters of one run of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub n_src: usize,
    pub n_threads: usize,
    pub rate: f64,
    pub freq_thresh: f64,
    pub length_thresh: f64,
}

impl RunParameters {
    /// Returns whether the detector is armed, i.e., none of its parameters is zero.
    pub fn fuses(&self) -> bool {
        self.n_src > 0 && self.freq_thresh > 0.0 && self.length_thresh > 0.0
    }
}

impl fmt::Display for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "N_src: {}, N_threads: {}, rate: {}, freq_thresh: {}, length_thresh: {}",
            self.n_src, self.n_threads, self.rate, self.freq_thresh, self.length_thresh
        )
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The simulation ran to the end.
    Stable,
    /// The detector aborted the simulation at `time` ms.
    Unstable { time: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub index: usize,
    pub params: RunParameters,
    pub outcome: Outcome,
}

/// Outcomes of all runs of a sweep, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub runs: Vec<RunReport>,
}

impl SweepReport {
    pub fn num_stable(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| run.outcome == Outcome::Stable)
            .count()
    }

    pub fn num_unstable(&self) -> usize {
        self.runs.len() - self.num_stable()
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Builds and simulates the network of one run, and checks its outcome against the rate
/// threshold: an `UnstableSpiking` error requires `rate >= freq_thresh` and a complete simulation
/// requires `rate <= freq_thresh` (or a disarmed detector). Any other endpoint error is returned
/// unchanged.
pub fn run_once<E: SimulationEndpoint + ?Sized>(
    endpoint: &mut E,
    params: &RunParameters,
    sim_time: f64,
    dump_file: &Path,
) -> Result<Outcome, ScenarioError> {
    with_redirected_output(dump_file, || -> Result<(), EndpointError> {
        endpoint.reset()?;
        endpoint.set_kernel_status(&status! { "total_num_virtual_procs" => params.n_threads })
    })??;

    let generator = endpoint.create("poisson_generator", 1, &status! { "rate" => params.rate })?;
    let parrots = endpoint.create("parrot_neuron", params.n_src, &status!())?;
    let detector = endpoint.create(
        "spike_detector_fuse",
        1,
        &status! {
            "frequency_thresh" => params.freq_thresh,
            "length_thresh" => params.length_thresh,
            "n_connected_neurons" => params.n_src,
        },
    )?;

    endpoint.connect(&generator, &parrots, ConnectionRule::AllToAll)?;
    endpoint.connect(&parrots, &detector, ConnectionRule::AllToAll)?;

    match with_redirected_output(dump_file, || endpoint.simulate(sim_time))? {
        Err(EndpointError::UnstableSpiking(_)) => {
            if params.rate < params.freq_thresh {
                return Err(ScenarioError::Assertion(format!(
                    "The Unstable Spiking was caught even though rate <= freq_thresh ({})",
                    params
                )));
            }
            let time = endpoint
                .get_kernel_status()?
                .get("time")
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    ScenarioError::Assertion("The kernel status has no valid time".to_string())
                })?;
            Ok(Outcome::Unstable { time })
        }
        Err(e) => Err(ScenarioError::Endpoint(e)),
        Ok(()) => {
            if params.fuses() && params.rate > params.freq_thresh {
                return Err(ScenarioError::Assertion(format!(
                    "The Unstable Spiking was not caught even though rate > freq_thresh ({})",
                    params
                )));
            }
            Ok(Outcome::Stable)
        }
    }
}

/// Runs every combination of the configuration in order, calling `on_run` after each run.
/// The sweep stops at the first failing run.
pub fn run_sweep<E, F>(
    endpoint: &mut E,
    config: &SweepConfig,
    mut on_run: F,
) -> Result<SweepReport, ScenarioError>
where
    E: SimulationEndpoint + ?Sized,
    F: FnMut(&RunReport),
{
    let mut report = SweepReport::default();
    for (index, params) in config.runs().into_iter().enumerate() {
        log::debug!("Run {} of {}: {:?}", index + 1, config.num_runs(), params);
        let outcome = run_once(endpoint, &params, config.sim_time, &config.dump_file)?;
        let run = RunReport {
            index,
            params,
            outcome,
        };
        on_run(&run);
        report.runs.push(run);
    }
    log::info!(
        "Sweep finished: {} stable and {} unstable run(s)",
        report.num_stable(),
        report.num_unstable()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_runs_order() {
        let config = SweepConfig {
            n_src: vec![100, 800],
            n_threads: vec![1],
            rate: vec![20.0, 100.0],
            freq_thresh: vec![60.0],
            length_thresh: vec![100.0, 200.0],
            ..SweepConfig::default()
        };
        let runs = config.runs();
        assert_eq!(runs.len(), config.num_runs());
        assert_eq!(runs.len(), 8);
        assert_eq!(
            runs[1],
            RunParameters {
                n_src: 100,
                n_threads: 1,
                rate: 20.0,
                freq_thresh: 60.0,
                length_thresh: 200.0
            }
        );
        assert_eq!(runs[2].rate, 100.0);
        assert_eq!(runs[4].n_src, 800);
    }

    #[test]
    fn test_empty_axis() {
        let config = SweepConfig {
            rate: vec![],
            ..SweepConfig::default()
        };
        assert!(config.runs().is_empty());
        assert_eq!(config.num_runs(), 0);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        let config = SweepConfig {
            n_threads: vec![2],
            dump_file: dir.path().join("dump.txt"),
            ..SweepConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(SweepConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_config_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        std::fs::write(&path, r#"{ "rate": [5.0], "sim_time": 100.0 }"#).unwrap();
        let config = SweepConfig::load_from(&path).unwrap();
        assert_eq!(config.rate, vec![5.0]);
        assert_eq!(config.sim_time, 100.0);
        assert_eq!(config.n_src, vec![100, 800]);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&Outcome::Unstable { time: 19.9 }).unwrap();
        assert_eq!(json, r#"{"outcome":"unstable","time":19.9}"#);
        let json = serde_json::to_string(&Outcome::Stable).unwrap();
        assert_eq!(json, r#"{"outcome":"stable"}"#);
    }

    #[test]
    fn test_params_display() {
        let params = SweepConfig::default().runs()[0];
        assert_eq!(
            params.to_string(),
            "N_src: 100, N_threads: 1, rate: 20, freq_thresh: 20, length_thresh: 100"
        );
    }

    #[test]
    fn test_report_counts() {
        let params = SweepConfig::default().runs()[0];
        let report = SweepReport {
            runs: vec![
                RunReport { index: 0, params, outcome: Outcome::Stable },
                RunReport { index: 1, params, outcome: Outcome::Unstable { time: 20.0 } },
                RunReport { index: 2, params, outcome: Outcome::Stable },
            ],
        };
        assert_eq!(report.num_stable(), 2);
        assert_eq!(report.num_unstable(), 1);
    }
}
