use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop a run before (or instead of) touching the target
#[derive(Debug, Error)]
pub enum Error {
    #[error("Target not found: {}", .0.display())]
    TargetNotFound(PathBuf),

    #[error(
        "Target is not an executable file (or lacks execute permission): {}",
        .0.display()
    )]
    NotExecutable(PathBuf),

    #[error("Target is not an ELF binary: {}", .0.display())]
    NotElf(PathBuf),

    #[error("No optimization tools found in PATH ({searched})")]
    NoTools { searched: String },

    #[error("Failed to create backup {}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
