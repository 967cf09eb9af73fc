use rand::Rng;

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::model::PersistedModel;

/// Number of input features (a flattened 20x20 pixel grid).
pub const INPUT_SIZE: usize = 400;
/// Number of output classes (digits 0-9).
pub const OUTPUT_SIZE: usize = 10;
/// Weights are drawn from `(-INIT_EPSILON, INIT_EPSILON)`.
pub const INIT_EPSILON: f64 = 0.06;

/// All trainable state of the network.
///
/// Shapes: `theta1` is `H x 400`, `theta2` is `10 x H`, `b1` is `H x 1`,
/// `b2` is `10 x 1`. Every constructor checks them, and the training update
/// only ever adds same-shape matrices, so they hold for the lifetime of the
/// value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub(crate) theta1: Matrix,
    pub(crate) theta2: Matrix,
    pub(crate) b1: Matrix,
    pub(crate) b2: Matrix,
}

impl Parameters {
    /// Fresh parameters: uniform random weights, zero biases.
    pub fn random<R: Rng + ?Sized>(hidden_units: usize, rng: &mut R) -> Result<Parameters> {
        if hidden_units == 0 {
            return Err(Error::InvalidHiddenUnits);
        }

        Ok(Parameters {
            theta1: Matrix::uniform(hidden_units, INPUT_SIZE, INIT_EPSILON, rng),
            theta2: Matrix::uniform(OUTPUT_SIZE, hidden_units, INIT_EPSILON, rng),
            b1: Matrix::zeros(hidden_units, 1),
            b2: Matrix::zeros(OUTPUT_SIZE, 1),
        })
    }

    pub fn hidden_units(&self) -> usize {
        self.theta1.rows
    }

    pub fn theta1(&self) -> &Matrix {
        &self.theta1
    }

    pub fn theta2(&self) -> &Matrix {
        &self.theta2
    }

    pub fn hidden_bias(&self) -> &Matrix {
        &self.b1
    }

    pub fn output_bias(&self) -> &Matrix {
        &self.b2
    }

    /// Checks that the four matrices agree with each other and with the
    /// fixed input/output sizes.
    pub fn check_dimensions(&self) -> Result<()> {
        let h = self.theta1.rows;
        let check_shape = |name: &str, m: &Matrix, rows: usize, cols: usize| {
            if m.rows == rows && m.cols == cols {
                Ok(())
            } else {
                Err(Error::CorruptModel(format!(
                    "{name} is {}x{}, expected {rows}x{cols}",
                    m.rows, m.cols
                )))
            }
        };

        if h == 0 {
            return Err(Error::CorruptModel("theta1 has no rows".to_owned()));
        }
        check_shape("theta1", &self.theta1, h, INPUT_SIZE)?;
        check_shape("theta2", &self.theta2, OUTPUT_SIZE, h)?;
        check_shape("b1", &self.b1, h, 1)?;
        check_shape("b2", &self.b2, OUTPUT_SIZE, 1)?;
        Ok(())
    }

    pub fn to_persisted(&self) -> PersistedModel {
        PersistedModel {
            theta1: self.theta1.data.clone(),
            theta2: self.theta2.data.clone(),
            b1: self.b1.data.clone(),
            b2: self.b2.data.clone(),
        }
    }
}

impl TryFrom<PersistedModel> for Parameters {
    type Error = Error;

    fn try_from(model: PersistedModel) -> Result<Parameters> {
        let matrix = |name: &str, data: Vec<Vec<f64>>| -> Result<Matrix> {
            let m = Matrix::from_rows(data)
                .ok_or_else(|| Error::CorruptModel(format!("{name} is empty or ragged")))?;
            if !m.is_finite() {
                return Err(Error::CorruptModel(format!("{name} contains non-finite values")));
            }
            Ok(m)
        };

        let params = Parameters {
            theta1: matrix("theta1", model.theta1)?,
            theta2: matrix("theta2", model.theta2)?,
            b1: matrix("b1", model.b1)?,
            b2: matrix("b2", model.b2)?,
        };
        params.check_dimensions()?;
        Ok(params)
    }
}
