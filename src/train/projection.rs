//! Two-dimensional projection of a vocabulary for visualisation.

use super::EmbeddingTable;
use crate::task::domain::Visualization;
use linfa::{ParamGuard, traits::Transformer};
use linfa_tsne::{TSneError, TSneParams};
use ndarray::Array2;
use thiserror::Error;

/// Smallest vocabulary projected with t-SNE. Smaller vocabularies keep their
/// first two coordinates.
pub const MIN_TSNE_VOCABULARY: usize = 4;

const MAX_PERPLEXITY: u32 = 30;

/// Errors raised while projecting a vocabulary.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The t-SNE pass rejected its parameters or input.
    #[error("t-SNE projection failed: {0}")]
    Tsne(#[from] TSneError),

    /// The projection returned a matrix of the wrong shape.
    #[error("projection produced {found} points for {expected} words")]
    Shape {
        /// Vocabulary size.
        expected: usize,
        /// Rows returned by the projection.
        found: usize,
    },
}

/// Reduces word vectors to plottable points.
pub trait Projector: Send + Sync {
    /// Projects every word of `table`, preserving vocabulary order.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] when the reduction fails.
    fn project(&self, table: &EmbeddingTable) -> Result<Visualization, ProjectionError>;
}

/// Barnes-Hut t-SNE with a fixed random seed, so the same vectors always
/// produce the same layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsneProjector {
    approx_threshold: f64,
    max_iter: usize,
}

impl Default for TsneProjector {
    fn default() -> Self {
        Self {
            approx_threshold: 0.5,
            max_iter: 1000,
        }
    }
}

impl TsneProjector {
    /// Overrides the Barnes-Hut approximation threshold.
    #[must_use]
    pub const fn with_approx_threshold(mut self, approx_threshold: f64) -> Self {
        self.approx_threshold = approx_threshold;
        self
    }

    /// Overrides the number of optimisation iterations.
    #[must_use]
    pub const fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Perplexity used for a vocabulary of `words` entries: at most 30 and
    /// small enough that `3 * perplexity <= words - 1`.
    #[must_use]
    pub fn perplexity_for(words: usize) -> f64 {
        let bound = words.saturating_sub(1) / 3;
        u32::try_from(bound).map_or(f64::from(MAX_PERPLEXITY), |bound| {
            f64::from(bound.clamp(1, MAX_PERPLEXITY))
        })
    }
}

impl Projector for TsneProjector {
    fn project(&self, table: &EmbeddingTable) -> Result<Visualization, ProjectionError> {
        let points = if table.len() < MIN_TSNE_VOCABULARY {
            leading_coordinates(table.vectors())
        } else {
            TSneParams::embedding_size(2)
                .perplexity(Self::perplexity_for(table.len()))
                .approx_threshold(self.approx_threshold)
                .max_iter(self.max_iter)
                .check()?
                .transform(table.vectors().clone())?
        };
        to_visualization(table, &points)
    }
}

/// First two columns of `vectors`, zero-padded when the dimension is one.
fn leading_coordinates(vectors: &Array2<f64>) -> Array2<f64> {
    Array2::from_shape_fn((vectors.nrows(), 2), |(row, column)| {
        vectors.get((row, column)).copied().unwrap_or_default()
    })
}

fn to_visualization(
    table: &EmbeddingTable,
    points: &Array2<f64>,
) -> Result<Visualization, ProjectionError> {
    if points.nrows() != table.len() || points.ncols() < 2 {
        return Err(ProjectionError::Shape {
            expected: table.len(),
            found: points.nrows(),
        });
    }
    Ok(Visualization {
        labels: table.words().to_vec(),
        x: points.column(0).to_vec(),
        y: points.column(1).to_vec(),
    })
}
