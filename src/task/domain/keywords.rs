//! Normalised keyword phrases used by filter tasks.

use super::TaskDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower-cased, single-space-joined keyword phrase.
///
/// Corpus rows are matched on exact equality with their normalised keyword
/// field, so `"Back  PAIN"` and `"back pain"` select the same documents while
/// `"back"` selects neither.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeywordPhrase(String);

impl KeywordPhrase {
    /// Normalises a raw phrase.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyKeywords`] when the phrase contains no
    /// non-whitespace characters.
    pub fn parse(raw: &str) -> Result<Self, TaskDomainError> {
        Self::from_keywords([raw])
    }

    /// Joins a list of keywords into one normalised phrase.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyKeywords`] when the keywords contain
    /// no non-whitespace characters.
    pub fn from_keywords<I, S>(keywords: I) -> Result<Self, TaskDomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words = Vec::new();
        for keyword in keywords {
            words.extend(keyword.as_ref().split_whitespace().map(str::to_lowercase));
        }
        if words.is_empty() {
            return Err(TaskDomainError::EmptyKeywords);
        }
        Ok(Self(words.join(" ")))
    }

    /// Returns the normalised phrase.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when a raw corpus keyword field matches this phrase.
    #[must_use]
    pub fn matches(&self, raw_field: &str) -> bool {
        let mut field_words = raw_field.split_whitespace().map(str::to_lowercase);
        let mut own_words = self.0.split(' ');
        loop {
            match (field_words.next(), own_words.next()) {
                (None, None) => return true,
                (Some(field), Some(own)) if field == own => {}
                _ => return false,
            }
        }
    }
}

impl TryFrom<String> for KeywordPhrase {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KeywordPhrase> for String {
    fn from(value: KeywordPhrase) -> Self {
        value.0
    }
}

impl AsRef<str> for KeywordPhrase {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for KeywordPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
