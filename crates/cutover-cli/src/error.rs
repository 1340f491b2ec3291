//! CLI errors.

use cutover_core::CutoverError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum CliError {
    /// The data directory could not be opened.
    #[error("failed to open store at {}: {source}", .path.display())]
    OpenStore {
        path: PathBuf,
        #[source]
        source: cutover_core::Error,
    },

    /// An engine operation failed.
    #[error(transparent)]
    Cutover(#[from] CutoverError),

    /// An argument was syntactically valid but unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be rendered.
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}
