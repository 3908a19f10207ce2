use std::io;

use thiserror::Error;

/// Errors raised while loading an ELF file.
///
/// These surface to the external CLI/RPC collaborators and map onto the
/// documented process exit codes: `NotAnElf`/`TruncatedFile` exit 2,
/// `UnsupportedArch` exit 3.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read input file")]
    Io(#[from] io::Error),

    #[error("not an ELF file")]
    NotAnElf,

    #[error("truncated or malformed ELF file: {0}")]
    TruncatedFile(String),

    #[error("unsupported ELF machine code: {0}")]
    UnsupportedArch(u16),
}
