//! Word-vector table parsed from the backend's text output.
//!
//! The file starts with a `<vocab_size> <dim>` header followed by one
//! `<word> <v1> ... <vdim>` row per word.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while reading a word-vector file.
#[derive(Debug, Error)]
pub enum EmbeddingParseError {
    /// The file could not be read.
    #[error("failed to read embeddings file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is empty.
    #[error("embeddings file has no header line")]
    MissingHeader,

    /// The header is not two positive integers.
    #[error("invalid embeddings header: {0:?}")]
    InvalidHeader(String),

    /// A row holds the wrong number of values.
    #[error("line {line}: expected {expected} values, found {found}")]
    WrongDimension {
        /// One-based line number.
        line: usize,
        /// Dimension declared in the header.
        expected: usize,
        /// Values present on the line.
        found: usize,
    },

    /// A value is not a finite float.
    #[error("line {line}: invalid vector value {value:?}")]
    InvalidValue {
        /// One-based line number.
        line: usize,
        /// Offending token.
        value: String,
    },

    /// A word appears on more than one row.
    #[error("line {line}: duplicate word {word:?}")]
    DuplicateWord {
        /// One-based line number.
        line: usize,
        /// Repeated word.
        word: String,
    },

    /// The number of rows disagrees with the header.
    #[error("expected {expected} vectors, found {found}")]
    RowCountMismatch {
        /// Vocabulary size declared in the header.
        expected: usize,
        /// Rows present in the file.
        found: usize,
    },
}

/// A similarity query named a word outside the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("word not in vocabulary: {0}")]
pub struct UnknownWord(pub String);

/// A word ranked by cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    /// The ranked word.
    pub word: String,
    /// Cosine similarity to the query vector.
    pub similarity: f64,
}

/// Parsed word vectors, one row per word in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    words: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Array2<f64>,
}

impl EmbeddingTable {
    /// Reads and parses the vector file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingParseError::Io`] when the file cannot be read and
    /// the other variants when its contents are malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, EmbeddingParseError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let name = path.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("embeddings path has no file name: {path}"),
            )
        })?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
        let text = dir.read_to_string(name)?;
        Self::parse(&text)
    }

    /// Parses the text of a vector file.
    ///
    /// # Errors
    ///
    /// Returns an error when the header is missing or malformed, a row has
    /// the wrong dimension or a non-finite value, a word repeats, or the row
    /// count disagrees with the header.
    pub fn parse(text: &str) -> Result<Self, EmbeddingParseError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(offset, line)| (offset + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());
        let (_, header) = lines.next().ok_or(EmbeddingParseError::MissingHeader)?;
        let (expected_rows, dim) = parse_header(header)?;

        // Header counts are untrusted, so capacity is bounded by the text.
        let rows_hint = expected_rows.min(text.lines().count());
        let values_hint = rows_hint.saturating_mul(dim).min(text.len());
        let mut words = Vec::with_capacity(rows_hint);
        let mut index = HashMap::with_capacity(rows_hint);
        let mut values = Vec::with_capacity(values_hint);
        for (line, row) in lines {
            let mut fields = row.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let before = values.len();
            for field in fields {
                values.push(parse_value(line, field)?);
            }
            let found = values.len() - before;
            if found != dim {
                return Err(EmbeddingParseError::WrongDimension {
                    line,
                    expected: dim,
                    found,
                });
            }
            if index.insert(word.to_owned(), words.len()).is_some() {
                return Err(EmbeddingParseError::DuplicateWord {
                    line,
                    word: word.to_owned(),
                });
            }
            words.push(word.to_owned());
        }

        if words.len() != expected_rows {
            return Err(EmbeddingParseError::RowCountMismatch {
                expected: expected_rows,
                found: words.len(),
            });
        }
        let vectors = Array2::from_shape_vec((expected_rows, dim), values).map_err(|_| {
            EmbeddingParseError::RowCountMismatch {
                expected: expected_rows,
                found: words.len(),
            }
        })?;
        Ok(Self {
            words,
            index,
            vectors,
        })
    }

    /// Words in file order.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Vector matrix, one row per word.
    #[must_use]
    pub const fn vectors(&self) -> &Array2<f64> {
        &self.vectors
    }

    /// Vocabulary size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` when the table holds no words.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Vector dimensionality.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Vector of `word`, if it is in the vocabulary.
    #[must_use]
    pub fn vector(&self, word: &str) -> Option<ArrayView1<'_, f64>> {
        self.index.get(word).map(|&row| self.vectors.row(row))
    }

    /// The `n` words closest to `word`, excluding `word` itself.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownWord`] when `word` is not in the vocabulary.
    pub fn nearest(&self, word: &str, n: usize) -> Result<Vec<Neighbour>, UnknownWord> {
        let target = self.require(word)?.to_owned();
        Ok(self.rank(&target, &[word], n))
    }

    /// The `n` words closest to `b - a + c`, excluding the three inputs.
    ///
    /// `analogy("man", "king", "woman", 1)` answers "man is to king as woman
    /// is to ?".
    ///
    /// # Errors
    ///
    /// Returns [`UnknownWord`] for the first input outside the vocabulary.
    pub fn analogy(
        &self,
        a: &str,
        b: &str,
        c: &str,
        n: usize,
    ) -> Result<Vec<Neighbour>, UnknownWord> {
        let a_vector = self.require(a)?;
        let b_vector = self.require(b)?;
        let c_vector = self.require(c)?;
        let target: Array1<f64> = &b_vector - &a_vector + &c_vector;
        Ok(self.rank(&target, &[a, b, c], n))
    }

    fn require(&self, word: &str) -> Result<ArrayView1<'_, f64>, UnknownWord> {
        self.vector(word)
            .ok_or_else(|| UnknownWord(word.to_owned()))
    }

    fn rank(&self, target: &Array1<f64>, exclude: &[&str], n: usize) -> Vec<Neighbour> {
        let mut ranked: Vec<Neighbour> = self
            .words
            .iter()
            .zip(self.vectors.rows())
            .filter(|(word, _)| !exclude.contains(&word.as_str()))
            .map(|(word, row)| Neighbour {
                word: word.clone(),
                similarity: cosine(row, target.view()),
            })
            .collect();
        ranked.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
        ranked.truncate(n);
        ranked
    }
}

fn parse_header(header: &str) -> Result<(usize, usize), EmbeddingParseError> {
    let invalid = || EmbeddingParseError::InvalidHeader(header.to_owned());
    let mut fields = header.split_whitespace();
    let (Some(rows), Some(dim), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(invalid());
    };
    let rows: usize = rows.parse().map_err(|_| invalid())?;
    let dim: usize = dim.parse().map_err(|_| invalid())?;
    if dim == 0 {
        return Err(invalid());
    }
    Ok((rows, dim))
}

fn parse_value(line: usize, field: &str) -> Result<f64, EmbeddingParseError> {
    field
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| EmbeddingParseError::InvalidValue {
            line,
            value: field.to_owned(),
        })
}

fn cosine(left: ArrayView1<'_, f64>, right: ArrayView1<'_, f64>) -> f64 {
    let norms = left.dot(&left).sqrt() * right.dot(&right).sqrt();
    if norms <= 0.0 {
        0.0
    } else {
        left.dot(&right) / norms
    }
}
