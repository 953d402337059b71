use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("model file not found: {}", path.display())]
    ModelNotFound { path: PathBuf },
    #[error("malformed model at line {line}: {msg}")]
    ModelFormat { line: usize, msg: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no candidate survived for token #{token}")]
    EmptyCandidate { token: usize },
    #[error("feature '{feature}' has a non-finite activation ({value})")]
    InvalidActivation { feature: String, value: f64 },
    #[error("expected {expected} feature contexts, got {found}")]
    ContextMismatch { expected: usize, found: usize },
    #[error("expected {expected} outcome scores, got {found}")]
    OutcomeMismatch { expected: usize, found: usize },
    #[error("sentence #{index}: {source}")]
    Sentence {
        index: usize,
        #[source]
        source: Box<Error>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("cannot start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn model_format<S: Into<String>>(line: usize, msg: S) -> Self {
        Self::ModelFormat {
            line,
            msg: msg.into(),
        }
    }

    pub(crate) fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wraps a per-sentence failure with the index of the sentence.
    pub fn in_sentence(self, index: usize) -> Self {
        Self::Sentence {
            index,
            source: Box::new(self),
        }
    }
}
