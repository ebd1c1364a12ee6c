//! Compute backend running the word2vec trainer in a container.
//!
//! The corpus directory is mounted read-only at [`TRAIN_MOUNT`] and a fresh
//! scratch directory read-write at [`SAVE_MOUNT`]. The trainer's output is
//! forwarded to the log line by line; once it exits, the file whose name
//! contains `embeddings_` is moved to the requested output path.

use super::{ComputeBackend, ComputeError};
use crate::task::domain::Hyperparameters;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// Image used when none is configured.
pub const DEFAULT_BACKEND_IMAGE: &str = "lexicon-word2vec:latest";

/// Mount point of the corpus directory inside the container.
pub const TRAIN_MOUNT: &str = "/data/train";

/// Mount point of the scratch output directory inside the container.
pub const SAVE_MOUNT: &str = "/data/save";

/// Analogy questions the trainer evaluates against after each epoch.
pub const EVAL_DATA_PATH: &str = "/app/word2vec/word2vec/trunk/questions-words.txt";

const TRAINER_SCRIPT: &str = "word2vec_optimized.py";
const EMBEDDINGS_MARKER: &str = "embeddings_";

/// Runs training through a container engine CLI such as `docker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerComputeBackend {
    program: String,
    image: String,
}

impl Default for ContainerComputeBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_IMAGE)
    }
}

impl ContainerComputeBackend {
    /// Creates a backend running `image` with `docker`.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            program: "docker".to_owned(),
            image: image.into(),
        }
    }

    /// Uses another container engine binary, for example `podman`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Container image the trainer runs in.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Builds the engine arguments for one training run.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::InvalidPath`] when `corpus` has no parent
    /// directory or file name.
    pub fn run_arguments(
        &self,
        corpus: &Utf8Path,
        save_dir: &Utf8Path,
        hparams: &Hyperparameters,
    ) -> Result<Vec<String>, ComputeError> {
        let invalid = || ComputeError::InvalidPath(corpus.to_path_buf());
        let corpus_dir = corpus.parent().ok_or_else(invalid)?;
        let corpus_name = corpus.file_name().ok_or_else(invalid)?;

        let mut arguments = vec![
            "run".to_owned(),
            "--rm".to_owned(),
            "-v".to_owned(),
            format!("{corpus_dir}:{TRAIN_MOUNT}:ro"),
            "-v".to_owned(),
            format!("{save_dir}:{SAVE_MOUNT}:rw"),
            self.image.clone(),
            "python".to_owned(),
            TRAINER_SCRIPT.to_owned(),
            "--train_data".to_owned(),
            format!("{TRAIN_MOUNT}/{corpus_name}"),
            "--eval_data".to_owned(),
            EVAL_DATA_PATH.to_owned(),
            "--save_path".to_owned(),
            SAVE_MOUNT.to_owned(),
        ];
        for (name, value) in hparams.backend_arguments() {
            arguments.push(format!("--{name}"));
            arguments.push(value);
        }
        Ok(arguments)
    }
}

#[async_trait]
impl ComputeBackend for ContainerComputeBackend {
    #[instrument(skip(self, hparams), fields(image = %self.image))]
    async fn train(
        &self,
        corpus: &Utf8Path,
        output: &Utf8Path,
        hparams: &Hyperparameters,
    ) -> Result<(), ComputeError> {
        let scratch = tempfile::tempdir()?;
        let save_dir = Utf8Path::from_path(scratch.path())
            .map(Utf8Path::to_path_buf)
            .ok_or_else(|| ComputeError::Backend("scratch directory is not UTF-8".to_owned()))?;
        let arguments = self.run_arguments(corpus, &save_dir, hparams)?;

        info!(program = %self.program, "starting compute backend");
        let mut child = Command::new(&self.program)
            .args(&arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ComputeError::Launch)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, _, last_error_line) = tokio::join!(
            child.wait(),
            forward_lines(stdout, "stdout"),
            forward_lines(stderr, "stderr"),
        );
        let status = status?;
        if !status.success() {
            return Err(ComputeError::Exited {
                status,
                detail: last_error_line.unwrap_or_default(),
            });
        }

        let produced = find_embeddings(&save_dir)
            .await?
            .ok_or_else(|| ComputeError::MissingOutput(save_dir.clone()))?;
        move_file(&produced, output).await?;
        info!(%output, "compute backend finished");
        Ok(())
    }
}

/// Logs each line of `stream` and returns the last non-empty one.
async fn forward_lines<R>(stream: Option<R>, name: &'static str) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream?).lines();
    let mut last = None;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                info!(stream = name, "{line}");
                last = Some(line.to_owned());
            }
            Ok(None) => break,
            Err(err) => {
                warn!(stream = name, error = %err, "stopped reading backend output");
                break;
            }
        }
    }
    last
}

async fn find_embeddings(save_dir: &Utf8Path) -> std::io::Result<Option<Utf8PathBuf>> {
    let mut entries = tokio::fs::read_dir(save_dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(name) = name.to_str().filter(|name| name.contains(EMBEDDINGS_MARKER)) {
            found.push(save_dir.join(name));
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

/// Renames `from` to `to`, copying when they sit on different filesystems.
async fn move_file(from: &Utf8Path, to: &Utf8Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}
