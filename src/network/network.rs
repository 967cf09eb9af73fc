use std::fmt;
use std::path::PathBuf;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::activation::sigmoid::{sigmoid, sigmoid_prime};
use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::model::{JsonFileStore, ModelStore};
use crate::network::parameters::{Parameters, INPUT_SIZE, OUTPUT_SIZE};

pub const DEFAULT_HIDDEN_UNITS: usize = 25;
/// Fixed step size of the online update.
pub const LEARNING_RATE: f64 = 0.1;
pub const DEFAULT_MODEL_PATH: &str = "nn.json";

/// How an engine is built.
///
/// With `persist` off the engine never touches the filesystem: nothing is
/// loaded at construction and `save` does nothing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub hidden_units: usize,
    pub persist: bool,
    pub model_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            hidden_units: DEFAULT_HIDDEN_UNITS,
            persist: true,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

impl EngineConfig {
    pub fn store(&self) -> Option<Box<dyn ModelStore>> {
        if self.persist {
            Some(Box::new(JsonFileStore::new(&self.model_path)))
        } else {
            None
        }
    }
}

/// One labeled image, in the shape the HTTP front end receives it.
///
/// The label is kept as a raw integer so out-of-range values reach the
/// engine and are reported as `InvalidLabel` instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    #[serde(rename = "y0")]
    pub input: Vec<f64>,
    pub label: i64,
}

impl TrainingExample {
    pub fn new(input: Vec<f64>, label: i64) -> TrainingExample {
        TrainingExample { input, label }
    }
}

/// A digit class, 0 through 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Label(u8);

impl Label {
    pub fn new(digit: i64) -> Option<Label> {
        if (0..OUTPUT_SIZE as i64).contains(&digit) {
            Some(Label(digit as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Intermediate values of one forward pass, all `n x 1` columns.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub hidden_pre_activation: Matrix,
    pub hidden_activation: Matrix,
    pub output_activation: Matrix,
}

/// Whether the engine's parameters came from a store or from random init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSource {
    Random,
    Loaded,
}

/// Builds random parameters, then replaces them with the stored model if
/// the store has one.
///
/// A stored model whose hidden layer size differs from `hidden_units` is
/// rejected; there is no migration between sizes.
pub fn load_or_initialize<R: Rng + ?Sized>(
    store: Option<&dyn ModelStore>,
    hidden_units: usize,
    rng: &mut R,
) -> Result<(Parameters, InitSource)> {
    let random = Parameters::random(hidden_units, rng)?;

    let Some(store) = store else {
        return Ok((random, InitSource::Random));
    };

    match store.load()? {
        None => {
            debug!(store = %store.describe(), "no persisted model, keeping random init");
            Ok((random, InitSource::Random))
        }
        Some(model) => {
            let params = checked_parameters(model.try_into()?, hidden_units)?;
            info!(store = %store.describe(), hidden_units, "loaded persisted model");
            Ok((params, InitSource::Loaded))
        }
    }
}

fn checked_parameters(params: Parameters, hidden_units: usize) -> Result<Parameters> {
    if params.hidden_units() != hidden_units {
        return Err(Error::CorruptModel(format!(
            "model has {} hidden units, engine is configured for {hidden_units}",
            params.hidden_units()
        )));
    }
    Ok(params)
}

fn validate_input(input: &[f64], index: Option<usize>) -> Result<()> {
    if input.len() != INPUT_SIZE {
        return Err(Error::DimensionMismatch {
            index,
            expected: INPUT_SIZE,
            actual: input.len(),
        });
    }
    if let Some(position) = input.iter().position(|x| !x.is_finite()) {
        return Err(Error::NonFiniteInput { index, position });
    }
    Ok(())
}

/// Single-hidden-layer sigmoid network for 20x20 digit images.
///
/// `train` takes `&mut self` and `predict` takes `&self`, so callers sharing
/// an engine across threads put it behind an `RwLock`: predictions can then
/// run side by side but never observe a half-applied update.
pub struct Network {
    params: Parameters,
    store: Option<Box<dyn ModelStore>>,
    init_source: InitSource,
}

impl Network {
    /// Builds an engine from `config`, loading `config.model_path` when
    /// persistence is on and the file exists.
    pub fn new(config: &EngineConfig) -> Result<Network> {
        Network::with_store(config.hidden_units, config.store(), &mut rand::thread_rng())
    }

    /// Builds an engine with an explicit store (or none) and RNG.
    pub fn with_store<R: Rng + ?Sized>(
        hidden_units: usize,
        store: Option<Box<dyn ModelStore>>,
        rng: &mut R,
    ) -> Result<Network> {
        let (params, init_source) = load_or_initialize(store.as_deref(), hidden_units, rng)?;
        Ok(Network {
            params,
            store,
            init_source,
        })
    }

    pub fn forward(&self, input: &[f64]) -> Result<ForwardPass> {
        validate_input(input, None)?;
        Ok(self.forward_column(&Matrix::column(input)))
    }

    fn forward_column(&self, x: &Matrix) -> ForwardPass {
        let p = &self.params;

        let hidden_pre_activation = &(&p.theta1 * x) + &p.b1;
        let hidden_activation = hidden_pre_activation.map(sigmoid);
        let output_pre_activation = &(&p.theta2 * &hidden_activation) + &p.b2;
        let output_activation = output_pre_activation.map(sigmoid);

        ForwardPass {
            hidden_pre_activation,
            hidden_activation,
            output_activation,
        }
    }

    /// Runs one forward/backward pass per example, in order, updating the
    /// parameters after each one.
    ///
    /// Each example is validated before it touches the parameters. On the
    /// first invalid example training stops and the error's `index` names
    /// it; every example before that index has already been applied.
    /// Returns the number of examples applied.
    pub fn train(&mut self, examples: &[TrainingExample]) -> Result<usize> {
        for (index, example) in examples.iter().enumerate() {
            validate_input(&example.input, Some(index))?;
            let label = Label::new(example.label).ok_or(Error::InvalidLabel {
                index,
                label: example.label,
            })?;
            self.step(&example.input, label);
        }

        debug!(examples = examples.len(), "applied training batch");
        Ok(examples.len())
    }

    fn step(&mut self, input: &[f64], label: Label) {
        let x = Matrix::column(input);
        let pass = self.forward_column(&x);

        let mut target = Matrix::zeros(OUTPUT_SIZE, 1);
        target.data[label.index()][0] = 1.0;

        // Plain target-minus-output signal on the output layer, no sigmoid
        // derivative factor. Stored models depend on this exact rule.
        let output_error = &target - &pass.output_activation;
        let hidden_error = (&self.params.theta2.transpose() * &output_error)
            .hadamard(&pass.hidden_pre_activation.map(sigmoid_prime));

        let theta1_step = &hidden_error * &x.transpose();
        let theta2_step = &output_error * &pass.hidden_activation.transpose();

        let p = &mut self.params;
        p.theta1.add_scaled(&theta1_step, LEARNING_RATE);
        p.theta2.add_scaled(&theta2_step, LEARNING_RATE);
        p.b2.add_scaled(&output_error, LEARNING_RATE);
        p.b1.add_scaled(&hidden_error, LEARNING_RATE);
    }

    /// Most activated output class. Ties go to the lowest digit.
    pub fn predict(&self, input: &[f64]) -> Result<Label> {
        let pass = self.forward(input)?;
        let digit = pass.output_activation.argmax();
        Ok(Label(digit as u8))
    }

    /// The ten output activations for `input`, each in (0, 1).
    pub fn output_activations(&self, input: &[f64]) -> Result<Vec<f64>> {
        Ok(self.forward(input)?.output_activation.column_values())
    }

    /// Writes the current parameters to the configured store. Does nothing
    /// when the engine was built without one.
    pub fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.save(&self.params.to_persisted())?;
        info!(store = %store.describe(), "saved model");
        Ok(())
    }

    /// Reloads parameters from the configured store.
    pub fn load(&mut self) -> Result<()> {
        let store = self.store.as_deref().ok_or(Error::MissingModel)?;
        let params = Self::read_from(store, self.hidden_units())?;
        self.params = params;
        self.init_source = InitSource::Loaded;
        Ok(())
    }

    /// Replaces the parameters with the model held by `store`. The current
    /// parameters are left untouched if loading fails.
    pub fn load_from(&mut self, store: &dyn ModelStore) -> Result<()> {
        self.params = Self::read_from(store, self.hidden_units())?;
        self.init_source = InitSource::Loaded;
        Ok(())
    }

    fn read_from(store: &dyn ModelStore, hidden_units: usize) -> Result<Parameters> {
        let model = store.load()?.ok_or(Error::MissingModel)?;
        let params = checked_parameters(model.try_into()?, hidden_units)?;
        info!(store = %store.describe(), "loaded persisted model");
        Ok(params)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn hidden_units(&self) -> usize {
        self.params.hidden_units()
    }

    pub fn init_source(&self) -> InitSource {
        self.init_source
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::model::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(2024)
    }

    #[test]
    fn label_accepts_only_digits() {
        assert_eq!(Label::new(0).map(Label::value), Some(0));
        assert_eq!(Label::new(9).map(Label::value), Some(9));
        assert!(Label::new(10).is_none());
        assert!(Label::new(-1).is_none());
    }

    #[test]
    fn training_example_uses_wire_field_names() {
        let example: TrainingExample =
            serde_json::from_str(r#"{"y0": [0.0, 1.0], "label": 7}"#).unwrap();
        assert_eq!(example, TrainingExample::new(vec![0.0, 1.0], 7));
    }

    #[test]
    fn no_store_means_random_init() {
        let (params, source) = load_or_initialize(None, 4, &mut rng()).unwrap();
        assert_eq!(source, InitSource::Random);
        assert_eq!(params.hidden_units(), 4);
    }

    #[test]
    fn empty_store_falls_back_to_random_init() {
        let store = MemoryStore::new();
        let (_, source) = load_or_initialize(Some(&store), 4, &mut rng()).unwrap();
        assert_eq!(source, InitSource::Random);
    }

    #[test]
    fn stored_model_wins_over_random_init() {
        let stored = Parameters::random(4, &mut StdRng::seed_from_u64(1)).unwrap();
        let store = MemoryStore::with_model(stored.to_persisted());

        let (params, source) = load_or_initialize(Some(&store), 4, &mut rng()).unwrap();

        assert_eq!(source, InitSource::Loaded);
        assert_eq!(params, stored);
    }

    #[test]
    fn stored_model_with_other_hidden_size_is_rejected() {
        let stored = Parameters::random(6, &mut StdRng::seed_from_u64(1)).unwrap();
        let store = MemoryStore::with_model(stored.to_persisted());

        let err = load_or_initialize(Some(&store), 4, &mut rng()).unwrap_err();
        assert!(matches!(err, Error::CorruptModel(_)), "{err:?}");
    }

    #[test]
    fn forward_pass_shapes() {
        let net = Network::with_store(5, None, &mut rng()).unwrap();
        let pass = net.forward(&[0.5; INPUT_SIZE]).unwrap();

        assert_eq!(pass.hidden_pre_activation.rows, 5);
        assert_eq!(pass.hidden_activation.rows, 5);
        assert_eq!(pass.output_activation.rows, OUTPUT_SIZE);
        assert!(pass
            .output_activation
            .column_values()
            .iter()
            .all(|&a| a > 0.0 && a < 1.0));
    }

    #[test]
    fn first_step_from_zero_input_matches_hand_computation() {
        let mut net = Network::with_store(3, None, &mut rng()).unwrap();
        let before = net.parameters().clone();

        net.train(&[TrainingExample::new(vec![0.0; INPUT_SIZE], 2)]).unwrap();
        let after = net.parameters();

        // Zero input: hidden pre-activation is b1 = 0, so hidden = 0.5 and
        // theta1 gets no update.
        assert_eq!(after.theta1(), before.theta1());
        for k in 0..OUTPUT_SIZE {
            let z: f64 = before.theta2().data[k].iter().map(|w| w * 0.5).sum();
            let out = sigmoid(z);
            let target = if k == 2 { 1.0 } else { 0.0 };
            let expected = LEARNING_RATE * (target - out);
            assert!((after.output_bias().data[k][0] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn save_without_store_is_a_no_op() {
        let net = Network::with_store(3, None, &mut rng()).unwrap();
        assert!(!net.is_persistent());
        net.save().unwrap();
    }

    #[test]
    fn explicit_load_without_anything_stored_fails() {
        let store: Box<dyn ModelStore> = Box::new(MemoryStore::new());
        let mut net = Network::with_store(3, Some(store), &mut rng()).unwrap();
        assert!(matches!(net.load(), Err(Error::MissingModel)));
    }
}
