//! Line-oriented training corpus written for the compute backend.

use super::PhraseDetector;
use crate::task::domain::CorpusNgram;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use std::io::{self, BufWriter, Write};

/// Name of the corpus file inside the task's scratch directory.
pub const CORPUS_FILE_NAME: &str = "corpus.txt";

/// Renders one `<processed n-gram>\t<count>` line per n-gram row.
///
/// Phrase counts are learned from every row first, one observation per
/// row, and then applied to each row in its original order.
#[must_use]
pub fn corpus_lines(ngrams: &[CorpusNgram]) -> Vec<String> {
    let mut detector = PhraseDetector::default();
    for row in ngrams {
        detector.observe(row.ngram.split_whitespace());
    }
    let phraser = detector.freeze();

    ngrams
        .iter()
        .map(|row| format!("{}\t{}", phraser.process(&row.ngram), row.count))
        .collect()
}

/// Writes the corpus for `ngrams` into `dir` and returns the file's path.
///
/// # Errors
///
/// Returns any I/O error raised while opening the directory or writing the
/// file.
pub fn write_corpus(dir: &Utf8Path, ngrams: &[CorpusNgram]) -> io::Result<Utf8PathBuf> {
    let handle = Dir::open_ambient_dir(dir, ambient_authority())?;
    let file = handle.create(CORPUS_FILE_NAME)?;
    let mut writer = BufWriter::new(file);
    for line in corpus_lines(ngrams) {
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(dir.join(CORPUS_FILE_NAME))
}
