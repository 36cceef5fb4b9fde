//! In-process simulation endpoint.
//!
//! The local kernel works at the level of firing rates: it knows which generators drive which
//! nodes, and advances the danger level of each fuse detector in closed form. It does not simulate
//! individual neurons. Event counts are sampled from Poisson distributions so that detectors
//! report plausible numbers of recorded spikes.
//!
//! Like the engine it stands in for, the kernel writes its log messages to the process standard
//! output.
use std::io::{self, Write};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};

use super::models::{
    Model, Node, NodeState, EXCEPTION_TEST_MODULE, FUSE_MODULE, TEST_EXCEPTION_MESSAGE,
    UNSTABLE_SPIKING_MESSAGE,
};
use super::{ConnectionRule, EndpointError, NodeCollection, SimulationEndpoint, Status, Value};
use crate::status;

/// The modules the local kernel can install.
pub const KNOWN_MODULES: [&str; 2] = [FUSE_MODULE, EXCEPTION_TEST_MODULE];

/// The default simulation resolution (in ms).
pub const DEFAULT_RESOLUTION: f64 = 0.1;
/// The default seed of the kernel random number generator.
pub const DEFAULT_RNG_SEED: u64 = 42;

/// Kernel-wide configuration, reset by [`SimulationEndpoint::reset`].
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    pub total_num_virtual_procs: usize,
    pub resolution: f64,
    pub rng_seed: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            total_num_virtual_procs: 1,
            resolution: DEFAULT_RESOLUTION,
            rng_seed: DEFAULT_RNG_SEED,
        }
    }
}

/// Simulation endpoint running in the current process.
#[derive(Debug)]
pub struct LocalKernel {
    config: KernelConfig,
    time: f64,
    fused: bool,
    modules: Vec<String>,
    nodes: Vec<Node>,
    connections: Vec<(usize, usize)>,
    rng: ChaCha8Rng,
}

impl Default for LocalKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalKernel {
    pub fn new() -> Self {
        let config = KernelConfig::default();
        let rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
        LocalKernel {
            config,
            time: 0.0,
            fused: false,
            modules: Vec::new(),
            nodes: Vec::new(),
            connections: Vec::new(),
            rng,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Returns the current simulation time (in ms).
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Returns the node with the given id. Ids start at 1.
    pub fn node(&self, gid: usize) -> Result<&Node, EndpointError> {
        gid.checked_sub(1)
            .and_then(|k| self.nodes.get(k))
            .ok_or_else(|| unknown_node(gid))
    }

    fn node_mut(&mut self, gid: usize) -> Result<&mut Node, EndpointError> {
        gid.checked_sub(1)
            .and_then(|k| self.nodes.get_mut(k))
            .ok_or_else(|| unknown_node(gid))
    }

    fn log(&self, level: &str, context: &str, message: &str) -> Result<(), EndpointError> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{} [{}]: {}", level, context, message)?;
        stdout.flush()?;
        Ok(())
    }

    /// Returns the total rate (in Hz) of the spikes received by each node during the interval
    /// `[start, start + duration)`, indexed by `gid - 1`. Parrots relay the spikes they receive.
    fn input_rates(&self, start: f64, duration: f64) -> Result<Vec<f64>, EndpointError> {
        let outgoing = outgoing(self.nodes.len(), &self.connections);
        let order = topological_order(&outgoing).ok_or_else(loop_error)?;

        let mut input = vec![0.0; self.nodes.len()];
        for k in order {
            let rate = match self.nodes[k].state() {
                NodeState::PoissonGenerator { rate } => *rate,
                NodeState::SpikeGenerator { spike_times } if duration > 0.0 => {
                    let count = spike_times
                        .iter()
                        .filter(|&&t| t >= start && t < start + duration)
                        .count();
                    count as f64 * 1e3 / duration
                }
                NodeState::ParrotNeuron => input[k],
                _ => 0.0,
            };
            for &target in outgoing[k].iter() {
                input[target] += rate;
            }
        }
        Ok(input)
    }

    fn check_model(&self, model: &str) -> Result<Model, EndpointError> {
        let unknown =
            || EndpointError::UnknownModelName(format!("/{} is not a known model name", model));
        let model = Model::from_name(model).ok_or_else(unknown)?;
        match model.module() {
            Some(module) if !self.modules.iter().any(|m| m == module) => Err(unknown()),
            _ => Ok(model),
        }
    }

    fn check_nodes(&self, nodes: &NodeCollection) -> Result<(), EndpointError> {
        nodes.iter().try_for_each(|gid| self.node(gid).map(|_| ()))
    }

    fn validate_kernel_params(&self, params: &Status) -> Result<KernelConfig, EndpointError> {
        let mut config = self.config.clone();
        for (key, value) in params.iter() {
            match key.as_str() {
                "total_num_virtual_procs" => {
                    config.total_num_virtual_procs = value
                        .as_u64()
                        .filter(|&n| n > 0)
                        .map(|n| n as usize)
                        .ok_or_else(|| {
                            EndpointError::BadParameter(
                                "total_num_virtual_procs must be a positive integer".to_string(),
                            )
                        })?;
                }
                "resolution" => {
                    let resolution = value
                        .as_f64()
                        .filter(|r| r.is_finite() && *r > 0.0)
                        .ok_or_else(|| {
                            EndpointError::BadParameter("resolution must be positive".to_string())
                        })?;
                    if !self.nodes.is_empty() && resolution != self.config.resolution {
                        return Err(EndpointError::BadParameter(
                            "resolution cannot be changed after nodes have been created".to_string(),
                        ));
                    }
                    config.resolution = resolution;
                }
                "rng_seed" => {
                    config.rng_seed = value.as_u64().ok_or_else(|| {
                        EndpointError::BadParameter(
                            "rng_seed must be a non-negative integer".to_string(),
                        )
                    })?;
                }
                "time" | "fused" | "network_size" | "num_connections" => {
                    return Err(EndpointError::BadParameter(format!("{} is read-only", key)));
                }
                _ => {
                    return Err(EndpointError::BadParameter(format!(
                        "Unused dictionary item '{}' for the kernel",
                        key
                    )));
                }
            }
        }
        Ok(config)
    }

    /// Advances every detector over `elapsed` ms and samples the events it records.
    fn advance(&mut self, drives: &[(usize, f64)], elapsed: f64) {
        for &(gid, rate) in drives.iter() {
            let n_new = sample_events(&mut self.rng, rate * elapsed * 1e-3);
            if let Ok(node) = self.node_mut(gid) {
                if let NodeState::SpikeDetectorFuse {
                    params,
                    danger_level,
                    n_events,
                } = node.state_mut()
                {
                    *danger_level = params.relax(*danger_level, rate, elapsed);
                    *n_events += n_new;
                }
            }
        }
    }
}

/// Lists the targets of every node, indexed by `gid - 1`.
fn outgoing(n_nodes: usize, connections: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut outgoing = vec![Vec::new(); n_nodes];
    for &(source, target) in connections.iter() {
        outgoing[source - 1].push(target - 1);
    }
    outgoing
}

/// Orders the nodes so that every source comes before its targets. Returns `None` if the
/// connections form a loop.
fn topological_order(outgoing: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut in_degree = vec![0_usize; outgoing.len()];
    for &target in outgoing.iter().flatten() {
        in_degree[target] += 1;
    }

    let mut ready: Vec<usize> = (0..outgoing.len()).filter(|&k| in_degree[k] == 0).collect();
    let mut order = Vec::with_capacity(outgoing.len());
    while let Some(k) = ready.pop() {
        order.push(k);
        for &target in outgoing[k].iter() {
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                ready.push(target);
            }
        }
    }
    (order.len() == outgoing.len()).then_some(order)
}

fn unknown_node(gid: usize) -> EndpointError {
    EndpointError::UnknownNode(format!("Node with id {} does not exist", gid))
}

fn loop_error() -> EndpointError {
    EndpointError::Other {
        kind: "IllegalConnection".to_string(),
        message: "Connections between parrot neurons must not form a loop".to_string(),
    }
}

fn sample_events(rng: &mut ChaCha8Rng, mean: f64) -> u64 {
    match Poisson::new(mean) {
        Ok(poisson) => poisson.sample(rng) as u64,
        Err(_) => 0,
    }
}

impl SimulationEndpoint for LocalKernel {
    fn install(&mut self, module: &str) -> Result<(), EndpointError> {
        if !KNOWN_MODULES.contains(&module) {
            return Err(EndpointError::Other {
                kind: "DynamicModuleManagementError".to_string(),
                message: format!("Module '{}' could not be opened.", module),
            });
        }
        if self.modules.iter().any(|m| m == module) {
            return Err(EndpointError::Other {
                kind: "DynamicModuleManagementError".to_string(),
                message: format!("Module '{}' is loaded already.", module),
            });
        }
        self.modules.push(module.to_string());
        log::info!("Module {} installed", module);
        Ok(())
    }

    fn create(
        &mut self,
        model: &str,
        n: usize,
        params: &Status,
    ) -> Result<NodeCollection, EndpointError> {
        let model = self.check_model(model)?;
        if n == 0 {
            return Err(EndpointError::BadParameter(
                "The number of nodes must be positive".to_string(),
            ));
        }

        let mut node = Node::new(model);
        node.set_status(params)?;

        let first = self.nodes.len() + 1;
        self.nodes.extend(std::iter::repeat(node).take(n));
        log::debug!("Created {} {} node(s) from id {}", n, model.name(), first);
        Ok(NodeCollection::range(first, n))
    }

    fn set_status(&mut self, nodes: &NodeCollection, params: &Status) -> Result<(), EndpointError> {
        self.check_nodes(nodes)?;
        let updated = nodes
            .iter()
            .map(|gid| {
                let mut node = self.node(gid)?.clone();
                node.set_status(params)?;
                Ok((gid, node))
            })
            .collect::<Result<Vec<(usize, Node)>, EndpointError>>()?;
        for (gid, node) in updated {
            *self.node_mut(gid)? = node;
        }
        Ok(())
    }

    fn get_status(&self, nodes: &NodeCollection, field: &str) -> Result<Vec<Value>, EndpointError> {
        nodes
            .iter()
            .map(|gid| {
                let node = self.node(gid)?;
                match field {
                    "global_id" => Ok(Value::from(gid)),
                    _ => node.get(field).ok_or_else(|| {
                        EndpointError::BadParameter(format!(
                            "Unknown status field '{}' for model '{}'",
                            field,
                            node.model().name()
                        ))
                    }),
                }
            })
            .collect()
    }

    fn connect(
        &mut self,
        sources: &NodeCollection,
        targets: &NodeCollection,
        rule: ConnectionRule,
    ) -> Result<(), EndpointError> {
        self.check_nodes(sources)?;
        self.check_nodes(targets)?;
        for gid in targets.iter() {
            let model = self.node(gid)?.model();
            if !model.accepts_input() {
                return Err(EndpointError::Other {
                    kind: "IllegalConnection".to_string(),
                    message: format!("Nodes of model '{}' do not accept input", model.name()),
                });
            }
        }

        let added: Vec<(usize, usize)> = match rule {
            ConnectionRule::AllToAll => sources
                .iter()
                .flat_map(|source| targets.iter().map(move |target| (source, target)))
                .collect(),
            ConnectionRule::OneToOne => {
                if sources.len() != targets.len() {
                    return Err(EndpointError::BadParameter(
                        "one_to_one requires sources and targets of equal size".to_string(),
                    ));
                }
                sources.iter().zip(targets.iter()).collect()
            }
        };

        // Spikes relayed around a loop of parrots would never die out.
        let mut connections = self.connections.clone();
        connections.extend(added);
        if topological_order(&outgoing(self.nodes.len(), &connections)).is_none() {
            return Err(loop_error());
        }
        self.connections = connections;
        Ok(())
    }

    fn simulate(&mut self, duration: f64) -> Result<(), EndpointError> {
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(EndpointError::BadParameter(
                "The simulation time must be non-negative".to_string(),
            ));
        }
        if self.fused {
            return Err(EndpointError::KernelFused(
                "The simulation was aborted by an earlier error; reset the kernel before simulating again"
                    .to_string(),
            ));
        }

        self.log(
            "INFO",
            "Simulate",
            &format!(
                "Simulating {} ms with {} virtual process(es).",
                duration, self.config.total_num_virtual_procs
            ),
        )?;

        if self.nodes.iter().any(|n| n.model() == Model::ThrowExceptionNode) {
            if self.config.total_num_virtual_procs > 1 {
                log::warn!("Exception raised on thread 0 only, other threads are stopped");
            }
            self.time += self.config.resolution.min(duration);
            self.fused = true;
            return Err(EndpointError::TestException(
                TEST_EXCEPTION_MESSAGE.to_string(),
            ));
        }

        let start = self.time;
        let input = self.input_rates(start, duration)?;
        let mut drives = Vec::new();
        let mut trip: Option<f64> = None;
        for k in 0..self.nodes.len() {
            let gid = k + 1;
            if let NodeState::SpikeDetectorFuse {
                params,
                danger_level,
                ..
            } = self.nodes[k].state()
            {
                if !params.is_fusing() {
                    self.log(
                        "WARNING",
                        "spike_detector_fuse::calibrate",
                        &format!("GID: {} Spike Detector Not Fusing", gid),
                    )?;
                }
                let rate = input[k];
                if let Some(t) = params.time_to_trip(*danger_level, rate) {
                    trip = Some(trip.map_or(t, |best| best.min(t)));
                }
                drives.push((gid, rate));
            }
        }

        // The detectors check their danger level once per step, so a trip is seen at the end of
        // the step during which the level crossed 1.
        let resolution = self.config.resolution;
        let trip = trip.map(|t| ((t / resolution).floor() + 1.0) * resolution);

        match trip {
            Some(t) if t <= duration => {
                self.advance(&drives, t);
                self.time = start + t;
                self.fused = true;
                log::debug!("Fuse tripped at {} ms", self.time);
                Err(EndpointError::UnstableSpiking(
                    UNSTABLE_SPIKING_MESSAGE.to_string(),
                ))
            }
            _ => {
                self.advance(&drives, duration);
                self.time = start + duration;
                self.log("INFO", "Simulate", "Simulation finished.")
            }
        }
    }

    fn reset(&mut self) -> Result<(), EndpointError> {
        self.config = KernelConfig::default();
        self.time = 0.0;
        self.fused = false;
        self.nodes.clear();
        self.connections.clear();
        self.rng = ChaCha8Rng::seed_from_u64(self.config.rng_seed);
        self.log("INFO", "ResetKernel", "The kernel was reset.")
    }

    fn set_kernel_status(&mut self, params: &Status) -> Result<(), EndpointError> {
        let config = self.validate_kernel_params(params)?;
        if config.rng_seed != self.config.rng_seed {
            self.rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
        }
        if config.total_num_virtual_procs != self.config.total_num_virtual_procs {
            self.log(
                "INFO",
                "SetKernelStatus",
                &format!(
                    "{} virtual process(es) configured.",
                    config.total_num_virtual_procs
                ),
            )?;
        }
        self.config = config;
        Ok(())
    }

    fn get_kernel_status(&self) -> Result<Status, EndpointError> {
        Ok(status! {
            "total_num_virtual_procs" => self.config.total_num_virtual_procs,
            "resolution" => self.config.resolution,
            "rng_seed" => self.config.rng_seed,
            "time" => self.time,
            "fused" => self.fused,
            "network_size" => self.nodes.len(),
            "num_connections" => self.connections.len(),
        })
    }
}
