use std::path::PathBuf;

use dotmatrix_core::error::{CartridgeError, StateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot load ROM: {0}")]
    Cartridge(#[from] CartridgeError),

    #[error("savestate: {0}")]
    State(#[from] StateError),

    #[error("cannot write screenshot: {0}")]
    Png(#[from] png::EncodingError),
}

impl CliError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
