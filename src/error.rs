//! Error type shared by every engine operation.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Input vector does not have exactly 400 features.
    ///
    /// `index` is the position of the offending example inside a training
    /// batch (and therefore the number of examples already applied), or
    /// `None` for a prediction.
    #[error("input has {actual} features, expected {expected}")]
    DimensionMismatch {
        index: Option<usize>,
        expected: usize,
        actual: usize,
    },

    /// Input contains a NaN or infinite feature.
    #[error("input feature {position} is not a finite number")]
    NonFiniteInput {
        index: Option<usize>,
        position: usize,
    },

    /// Training label is not a digit.
    #[error("label {label} of example {index} is outside 0..=9")]
    InvalidLabel { index: usize, label: i64 },

    /// Persisted model could not be turned into a consistent set of
    /// parameters.
    #[error("corrupt model: {0}")]
    CorruptModel(String),

    /// An explicit load found no persisted model.
    #[error("no persisted model to load")]
    MissingModel,

    #[error("hidden layer needs at least one unit")]
    InvalidHiddenUnits,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Position of the failing example within a training batch. Every
    /// example before it was applied.
    pub fn example_index(&self) -> Option<usize> {
        match self {
            Error::DimensionMismatch { index, .. } | Error::NonFiniteInput { index, .. } => *index,
            Error::InvalidLabel { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// True for errors caused by the caller's input rather than by the
    /// engine or its storage.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. }
                | Error::NonFiniteInput { .. }
                | Error::InvalidLabel { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::Io(err.into())
        } else {
            Error::CorruptModel(err.to_string())
        }
    }
}
