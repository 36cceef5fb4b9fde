//! Node models of the local kernel and their parameters.
use super::{EndpointError, Status, Value};

/// The module providing the `spike_detector_fuse` model.
pub const FUSE_MODULE: &str = "spikedetfusemodule";
/// The module providing the `throw_exception_node` model.
pub const EXCEPTION_TEST_MODULE: &str = "nestdeadlocktestmodule";

/// Message of the error raised when the fuse detector trips.
pub const UNSTABLE_SPIKING_MESSAGE: &str =
    "The Network seems to be in a regime of unstable spiking, terminating simulation";
/// Message of the error raised by the exception test node.
pub const TEST_EXCEPTION_MESSAGE: &str = "Test Exception Thrown";

/// Fraction of the remaining distance to the steady state left after one `length_thresh`.
const DANGER_RESIDUAL: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    SpikeGenerator,
    PoissonGenerator,
    ParrotNeuron,
    SpikeDetectorFuse,
    ThrowExceptionNode,
}

impl Model {
    pub const ALL: [Model; 5] = [
        Model::SpikeGenerator,
        Model::PoissonGenerator,
        Model::ParrotNeuron,
        Model::SpikeDetectorFuse,
        Model::ThrowExceptionNode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Model::SpikeGenerator => "spike_generator",
            Model::PoissonGenerator => "poisson_generator",
            Model::ParrotNeuron => "parrot_neuron",
            Model::SpikeDetectorFuse => "spike_detector_fuse",
            Model::ThrowExceptionNode => "throw_exception_node",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Model::ALL.into_iter().find(|model| model.name() == name)
    }

    /// Returns the module that must be installed before the model can be created, if any.
    pub fn module(&self) -> Option<&'static str> {
        match self {
            Model::SpikeDetectorFuse => Some(FUSE_MODULE),
            Model::ThrowExceptionNode => Some(EXCEPTION_TEST_MODULE),
            _ => None,
        }
    }

    /// Returns whether nodes of this model can be the target of a connection.
    pub fn accepts_input(&self) -> bool {
        matches!(self, Model::ParrotNeuron | Model::SpikeDetectorFuse)
    }
}

/// Parameters of the fuse detector.
///
/// The detector keeps a danger level which relaxes towards `rate / frequency_thresh`, where
/// `rate` is the mean firing rate of the `n_connected_neurons` sources. The relaxation covers 99%
/// of the distance to the steady state in `length_thresh` ms. The simulation is aborted as soon as
/// the danger level exceeds 1. Setting any of the three parameters to 0 disables the fuse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FuseParameters {
    pub frequency_thresh: f64,
    pub length_thresh: f64,
    pub n_connected_neurons: i64,
}

impl FuseParameters {
    /// Create fuse parameters, returning an error if any of them is negative.
    pub fn build(
        frequency_thresh: f64,
        length_thresh: f64,
        n_connected_neurons: i64,
    ) -> Result<Self, EndpointError> {
        let params = FuseParameters {
            frequency_thresh,
            length_thresh,
            n_connected_neurons,
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), EndpointError> {
        if !(self.frequency_thresh >= 0.0 && self.length_thresh >= 0.0)
            || self.n_connected_neurons < 0
        {
            return Err(EndpointError::BadParameter(
                "length_thresh, frequency_thresh, and n_connected_neurons must be non-negative"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_fusing(&self) -> bool {
        self.frequency_thresh > 0.0 && self.length_thresh > 0.0 && self.n_connected_neurons > 0
    }

    /// Returns the danger level reached in the long run when the sources fire `total_rate` spikes
    /// per second altogether.
    pub fn steady_danger(&self, total_rate: f64) -> f64 {
        match self.is_fusing() {
            true => total_rate / (self.frequency_thresh * self.n_connected_neurons as f64),
            false => 0.0,
        }
    }

    /// Returns the time constant (in ms) of the danger level relaxation.
    pub fn time_constant(&self) -> f64 {
        self.length_thresh / -DANGER_RESIDUAL.ln()
    }

    /// Returns the danger level after `elapsed` ms, starting at `danger` under a constant drive.
    pub fn relax(&self, danger: f64, total_rate: f64, elapsed: f64) -> f64 {
        if !self.is_fusing() {
            return 0.0;
        }
        let steady = self.steady_danger(total_rate);
        steady + (danger - steady) * (-elapsed / self.time_constant()).exp()
    }

    /// Returns the time (in ms) after which the danger level, starting at `danger`, exceeds 1, or
    /// `None` if it never does under the given drive.
    pub fn time_to_trip(&self, danger: f64, total_rate: f64) -> Option<f64> {
        if !self.is_fusing() {
            return None;
        }
        if danger > 1.0 {
            return Some(0.0);
        }
        let steady = self.steady_danger(total_rate);
        match steady > 1.0 {
            true => Some(self.time_constant() * ((steady - danger) / (steady - 1.0)).ln()),
            false => None,
        }
    }

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, EndpointError> {
        match key {
            "frequency_thresh" => self.frequency_thresh = number(key, value)?,
            "length_thresh" => self.length_thresh = number(key, value)?,
            "n_connected_neurons" => {
                self.n_connected_neurons = value.as_i64().ok_or_else(|| {
                    EndpointError::BadParameter(format!("{} must be an integer", key))
                })?
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Model-specific state of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeState {
    SpikeGenerator {
        spike_times: Vec<f64>,
    },
    PoissonGenerator {
        rate: f64,
    },
    ParrotNeuron,
    SpikeDetectorFuse {
        params: FuseParameters,
        danger_level: f64,
        n_events: u64,
    },
    ThrowExceptionNode,
}

/// A node of the local kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    model: Model,
    state: NodeState,
}

impl Node {
    /// Create a node of the given model with default parameters.
    pub fn new(model: Model) -> Self {
        let state = match model {
            Model::SpikeGenerator => NodeState::SpikeGenerator {
                spike_times: Vec::new(),
            },
            Model::PoissonGenerator => NodeState::PoissonGenerator { rate: 0.0 },
            Model::ParrotNeuron => NodeState::ParrotNeuron,
            Model::SpikeDetectorFuse => NodeState::SpikeDetectorFuse {
                params: FuseParameters::default(),
                danger_level: 0.0,
                n_events: 0,
            },
            Model::ThrowExceptionNode => NodeState::ThrowExceptionNode,
        };
        Node { model, state }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    /// Applies the parameters in `params`. Either all of them are applied or, on error, none.
    pub fn set_status(&mut self, params: &Status) -> Result<(), EndpointError> {
        let mut state = self.state.clone();
        for (key, value) in params.iter() {
            let accessed = match &mut state {
                NodeState::SpikeGenerator { spike_times } if key == "spike_times" => {
                    *spike_times = times(key, value)?;
                    true
                }
                NodeState::PoissonGenerator { rate } if key == "rate" => {
                    *rate = number(key, value)?;
                    if *rate < 0.0 {
                        return Err(EndpointError::BadParameter(
                            "rate must be non-negative".to_string(),
                        ));
                    }
                    true
                }
                NodeState::SpikeDetectorFuse { params, .. } => params.update(key, value)?,
                _ => false,
            };
            if !accessed {
                return Err(EndpointError::BadParameter(format!(
                    "Unused dictionary item '{}' for model '{}'",
                    key,
                    self.model.name()
                )));
            }
        }
        if let NodeState::SpikeDetectorFuse { params, .. } = &state {
            params.validate()?;
        }
        self.state = state;
        Ok(())
    }

    /// Returns the value of a model-specific status field.
    pub fn get(&self, field: &str) -> Option<Value> {
        match (&self.state, field) {
            (_, "model") => Some(Value::from(self.model.name())),
            (NodeState::SpikeGenerator { spike_times }, "spike_times") => {
                Some(Value::from(spike_times.clone()))
            }
            (NodeState::PoissonGenerator { rate }, "rate") => Some(Value::from(*rate)),
            (NodeState::SpikeDetectorFuse { params, .. }, "frequency_thresh") => {
                Some(Value::from(params.frequency_thresh))
            }
            (NodeState::SpikeDetectorFuse { params, .. }, "length_thresh") => {
                Some(Value::from(params.length_thresh))
            }
            (NodeState::SpikeDetectorFuse { params, .. }, "n_connected_neurons") => {
                Some(Value::from(params.n_connected_neurons))
            }
            (NodeState::SpikeDetectorFuse { n_events, .. }, "n_events") => {
                Some(Value::from(*n_events))
            }
            _ => None,
        }
    }
}

fn number(key: &str, value: &Value) -> Result<f64, EndpointError> {
    match value.as_f64() {
        Some(x) if x.is_finite() => Ok(x),
        _ => Err(EndpointError::BadParameter(format!(
            "{} must be a finite number",
            key
        ))),
    }
}

fn times(key: &str, value: &Value) -> Result<Vec<f64>, EndpointError> {
    let invalid =
        || EndpointError::BadParameter(format!("{} must be sorted non-negative times", key));
    let times = value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|t| t.as_f64().filter(|t| t.is_finite() && *t >= 0.0).ok_or_else(invalid))
        .collect::<Result<Vec<f64>, EndpointError>>()?;
    if times.windows(2).any(|w| w[0] > w[1]) {
        return Err(invalid());
    }
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status;

    #[test]
    fn test_model_names() {
        for model in Model::ALL {
            assert_eq!(Model::from_name(model.name()), Some(model));
        }
        assert_eq!(Model::from_name("iaf_psc_alpha"), None);
        assert_eq!(Model::SpikeDetectorFuse.module(), Some(FUSE_MODULE));
        assert_eq!(Model::PoissonGenerator.module(), None);
    }

    #[test]
    fn test_fuse_negative_threshold() {
        let mut node = Node::new(Model::SpikeDetectorFuse);
        let e = node.set_status(&status! { "frequency_thresh" => -0.1 }).unwrap_err();
        assert!(e.to_string().starts_with("BadParameter"));
        assert!(e.to_string().contains("frequency_thresh"));
    }

    #[test]
    fn test_fuse_set_is_transactional() {
        let mut node = Node::new(Model::SpikeDetectorFuse);
        node.set_status(&status! { "frequency_thresh" => 60.0, "length_thresh" => 100.0 })
            .unwrap();
        assert!(node
            .set_status(&status! { "frequency_thresh" => 20.0, "length_thresh" => -1.0 })
            .is_err());
        assert_eq!(node.get("frequency_thresh"), Some(Value::from(60.0)));
        assert_eq!(node.get("length_thresh"), Some(Value::from(100.0)));
    }

    #[test]
    fn test_fuse_integer_neurons() {
        let mut node = Node::new(Model::SpikeDetectorFuse);
        assert!(node.set_status(&status! { "n_connected_neurons" => 1.5 }).is_err());
        node.set_status(&status! { "n_connected_neurons" => 800 }).unwrap();
        assert_eq!(node.get("n_connected_neurons"), Some(Value::from(800)));
    }

    #[test]
    fn test_unused_parameter() {
        let mut node = Node::new(Model::ParrotNeuron);
        assert_eq!(
            node.set_status(&status! { "rate" => 10.0 }),
            Err(EndpointError::BadParameter(
                "Unused dictionary item 'rate' for model 'parrot_neuron'".to_string()
            ))
        );
    }

    #[test]
    fn test_poisson_rate() {
        let mut node = Node::new(Model::PoissonGenerator);
        assert!(node.set_status(&status! { "rate" => -20.0 }).is_err());
        node.set_status(&status! { "rate" => 20.0 }).unwrap();
        assert_eq!(node.get("rate"), Some(Value::from(20.0)));
    }

    #[test]
    fn test_spike_times() {
        let mut node = Node::new(Model::SpikeGenerator);
        assert!(node.set_status(&status! { "spike_times" => vec![2.0, 1.0] }).is_err());
        assert!(node.set_status(&status! { "spike_times" => vec![-1.0] }).is_err());
        node.set_status(&status! { "spike_times" => vec![1.0, 2.0, 2.5] }).unwrap();
        assert_eq!(node.get("spike_times"), Some(Value::from(vec![1.0, 2.0, 2.5])));
    }

    #[test]
    fn test_disabled_fuse() {
        let params = FuseParameters::build(0.0, 100.0, 10).unwrap();
        assert!(!params.is_fusing());
        assert_eq!(params.time_to_trip(0.0, 1e6), None);
    }

    #[test]
    fn test_time_to_trip() {
        let params = FuseParameters::build(60.0, 100.0, 1).unwrap();
        assert_eq!(params.time_to_trip(0.0, 20.0), None);
        assert_eq!(params.time_to_trip(0.0, 60.0), None);

        let t = params.time_to_trip(0.0, 100.0).unwrap();
        assert!((t - 100.0 * 0.4_f64.ln() / 0.01_f64.ln()).abs() < 1e-9);
        assert!((params.relax(0.0, 100.0, t) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_relax_converges_within_length() {
        let params = FuseParameters::build(60.0, 200.0, 1).unwrap();
        assert!((params.relax(0.0, 60.0, 200.0) - 0.99).abs() < 1e-9);
    }
}
