//! This crate provides tools for testing spiking network simulators against their fuse detector.
//!
//! # Capturing Output
//!
//! The [`redirect`] module swaps the process standard output, at the file-descriptor level, for a
//! file during a scope. Output from native code and child processes is captured as well, and the
//! original output is restored on every exit path.
//!
//! ```rust
//! use rusty_fuse::redirect::{with_redirected_output, DEFAULT_SINK};
//!
//! // Silence a noisy call
//! let answer = with_redirected_output(DEFAULT_SINK, || {
//!     println!("nobody will see this");
//!     42
//! })
//! .unwrap();
//! assert_eq!(answer, 42);
//! ```
//!
//! # Driving a Simulator
//!
//! The [`endpoint`] module defines the calls offered by a simulation endpoint and the errors it
//! raises. [`endpoint::kernel::LocalKernel`] implements them in-process.
//!
//! ```rust
//! use rusty_fuse::endpoint::{ConnectionRule, EndpointError, SimulationEndpoint};
//! use rusty_fuse::endpoint::kernel::LocalKernel;
//! use rusty_fuse::status;
//!
//! let mut kernel = LocalKernel::new();
//! kernel.install("spikedetfusemodule").unwrap();
//!
//! // A Poisson generator drives 100 parrots, all recorded by a fuse detector
//! let generator = kernel.create("poisson_generator", 1, &status! { "rate" => 100.0 }).unwrap();
//! let parrots = kernel.create("parrot_neuron", 100, &status!()).unwrap();
//! let detector = kernel
//!     .create(
//!         "spike_detector_fuse",
//!         1,
//!         &status! { "frequency_thresh" => 60.0, "length_thresh" => 100.0, "n_connected_neurons" => 100 },
//!     )
//!     .unwrap();
//! kernel.connect(&generator, &parrots, ConnectionRule::AllToAll).unwrap();
//! kernel.connect(&parrots, &detector, ConnectionRule::AllToAll).unwrap();
//!
//! // The rate exceeds the threshold: the detector aborts the simulation
//! match kernel.simulate(500.0) {
//!     Err(EndpointError::UnstableSpiking(_)) => assert!(kernel.time() < 500.0),
//!     other => panic!("unexpected outcome: {:?}", other),
//! }
//! ```
//!
//! # Running Scenarios
//!
//! The [`scenario`] module contains the checks run by the binaries of this crate: rejection of
//! illegal detector parameters, the stability sweep and the propagation of node exceptions.

pub mod endpoint;
pub mod redirect;
pub mod scenario;

/// Environment variable pointing to a JSON sweep configuration.
pub const CONFIG_ENV_VAR: &str = "RUSTY_FUSE_CONFIG";
