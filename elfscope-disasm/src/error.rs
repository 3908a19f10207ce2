use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisasmError {
    #[error("architecture {0} has no disassembler backend")]
    UnsupportedArch(elfscope_common::Arch),

    #[error("failed to initialize disassembler backend: {0}")]
    BackendInit(String),
}
