//! Hyperparameter bundle for embedding training.

use super::TaskDomainError;
use serde::{Deserialize, Serialize};

/// Skip-gram negative-sampling training parameters.
///
/// Field names match the command-line flags understood by the compute
/// backend, so the bundle is forwarded verbatim as `--<name> <value>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Embedding dimensionality.
    pub embedding_size: u32,
    /// Number of training epochs.
    pub epochs_to_train: u32,
    /// Initial learning rate.
    pub learning_rate: f64,
    /// Negative samples per positive example.
    pub num_neg_samples: u32,
    /// Examples per training batch.
    pub batch_size: u32,
    /// Parallel training steps inside the backend, if overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_steps: Option<u32>,
    /// Context window on each side of the target word.
    pub window_size: u32,
    /// Words occurring fewer times than this are dropped.
    pub min_count: u32,
    /// Subsampling threshold for frequent words.
    pub subsample: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            embedding_size: 200,
            epochs_to_train: 15,
            learning_rate: 0.025,
            num_neg_samples: 25,
            batch_size: 500,
            concurrent_steps: None,
            window_size: 5,
            min_count: 5,
            subsample: 1e-3,
        }
    }
}

impl Hyperparameters {
    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidHyperparameter`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), TaskDomainError> {
        let counts = [
            ("embedding_size", Some(self.embedding_size)),
            ("epochs_to_train", Some(self.epochs_to_train)),
            ("num_neg_samples", Some(self.num_neg_samples)),
            ("batch_size", Some(self.batch_size)),
            ("concurrent_steps", self.concurrent_steps),
            ("window_size", Some(self.window_size)),
            ("min_count", Some(self.min_count)),
        ];
        for (name, value) in counts {
            if value == Some(0) {
                return Err(TaskDomainError::InvalidHyperparameter {
                    name,
                    reason: "must be a positive integer".to_owned(),
                });
            }
        }

        for (name, value) in [
            ("learning_rate", self.learning_rate),
            ("subsample", self.subsample),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TaskDomainError::InvalidHyperparameter {
                    name,
                    reason: format!("must be a finite positive number, got {value}"),
                });
            }
        }
        Ok(())
    }

    /// Returns `(flag, value)` pairs in declaration order for the backend
    /// command line. Unset optional values are omitted.
    #[must_use]
    pub fn backend_arguments(&self) -> Vec<(&'static str, String)> {
        let mut arguments = vec![
            ("embedding_size", self.embedding_size.to_string()),
            ("epochs_to_train", self.epochs_to_train.to_string()),
            ("learning_rate", self.learning_rate.to_string()),
            ("num_neg_samples", self.num_neg_samples.to_string()),
            ("batch_size", self.batch_size.to_string()),
        ];
        if let Some(steps) = self.concurrent_steps {
            arguments.push(("concurrent_steps", steps.to_string()));
        }
        arguments.extend([
            ("window_size", self.window_size.to_string()),
            ("min_count", self.min_count.to_string()),
            ("subsample", self.subsample.to_string()),
        ]);
        arguments
    }
}
