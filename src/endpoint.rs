//! Call/response contract of a spiking network simulation endpoint.
//!
//! The endpoint owns the network: callers create nodes, set and read their status dictionaries,
//! connect them and run the simulation. Failures are reported as tagged [`EndpointError`]s.
//!
//! - [`kernel`]: an in-process endpoint with rate-level behaviour
//! - [`models`]: the node models known to that endpoint
//! - [`error`]: the error taxonomy
//!
//! # Example
//!
//! ```rust
//! use rusty_fuse::endpoint::{ConnectionRule, SimulationEndpoint, Value};
//! use rusty_fuse::endpoint::kernel::LocalKernel;
//! use rusty_fuse::status;
//!
//! let mut kernel = LocalKernel::new();
//! let generator = kernel.create("poisson_generator", 1, &status! { "rate" => 20.0 }).unwrap();
//! let parrots = kernel.create("parrot_neuron", 10, &status! {}).unwrap();
//! kernel.connect(&generator, &parrots, ConnectionRule::AllToAll).unwrap();
//!
//! assert_eq!(kernel.get_status(&generator, "rate").unwrap(), vec![Value::from(20.0)]);
//! ```
use serde::{Deserialize, Serialize};

pub mod error;
pub mod kernel;
pub mod models;

pub use error::{EndpointError, ErrorKind};
pub use serde_json::{Map, Value};

/// A status dictionary, as exchanged with the endpoint.
pub type Status = Map<String, Value>;

/// Builds a [`Status`] dictionary from `key => value` pairs.
#[macro_export]
macro_rules! status {
    () => {
        $crate::endpoint::Status::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut status = $crate::endpoint::Status::new();
        $(
            status.insert(::std::string::String::from($key), $crate::endpoint::Value::from($value));
        )+
        status
    }};
}

/// An ordered collection of node ids. Ids start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeCollection {
    gids: Vec<usize>,
}

impl NodeCollection {
    pub fn new(gids: Vec<usize>) -> Self {
        NodeCollection { gids }
    }

    /// Returns the collection of `n` consecutive ids starting at `first`.
    pub fn range(first: usize, n: usize) -> Self {
        NodeCollection {
            gids: (first..first + n).collect(),
        }
    }

    pub fn gids(&self) -> &[usize] {
        &self.gids[..]
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.gids.iter().copied()
    }

    pub fn first(&self) -> Option<usize> {
        self.gids.first().copied()
    }

    pub fn len(&self) -> usize {
        self.gids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gids.is_empty()
    }

    /// Returns the collection made of the ids of `self` followed by those of `other`.
    pub fn concat(&self, other: &NodeCollection) -> Self {
        NodeCollection {
            gids: self.gids.iter().chain(other.gids.iter()).copied().collect(),
        }
    }
}

/// How sources are wired to targets by [`SimulationEndpoint::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRule {
    /// Every source is connected to every target.
    #[default]
    AllToAll,
    /// The k-th source is connected to the k-th target.
    OneToOne,
}

/// The operations offered by a simulation endpoint. Every call is a single attempt.
pub trait SimulationEndpoint {
    /// Loads an extension module providing additional models.
    fn install(&mut self, module: &str) -> Result<(), EndpointError>;

    /// Creates `n` nodes of the given model, with `params` applied to each of them.
    fn create(&mut self, model: &str, n: usize, params: &Status)
        -> Result<NodeCollection, EndpointError>;

    /// Updates the status of the given nodes. Out-of-domain values are rejected with
    /// [`EndpointError::BadParameter`].
    fn set_status(&mut self, nodes: &NodeCollection, params: &Status) -> Result<(), EndpointError>;

    /// Reads one status field of each of the given nodes.
    fn get_status(&self, nodes: &NodeCollection, field: &str) -> Result<Vec<Value>, EndpointError>;

    fn connect(
        &mut self,
        sources: &NodeCollection,
        targets: &NodeCollection,
        rule: ConnectionRule,
    ) -> Result<(), EndpointError>;

    /// Advances the simulation by `duration` ms. Runaway spiking detected by a fuse detector is
    /// reported as [`EndpointError::UnstableSpiking`].
    fn simulate(&mut self, duration: f64) -> Result<(), EndpointError>;

    /// Removes all nodes and connections and restores the default kernel configuration.
    fn reset(&mut self) -> Result<(), EndpointError>;

    fn set_kernel_status(&mut self, params: &Status) -> Result<(), EndpointError>;

    fn get_kernel_status(&self) -> Result<Status, EndpointError>;
}
