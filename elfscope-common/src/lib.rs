//! Shared types used throughout the ElfScope workspace: architecture
//! descriptors and a memory-mapped byte view. Kept dependency-light so that
//! every downstream crate (`elfscope-loader`, `elfscope-disasm`,
//! `elfscope-analysis`) can build on it without pulling in format-specific
//! parsing crates.

mod arch;
mod byteview;

pub use arch::{Arch, Bitness, Endianness};
pub use byteview::ByteView;

/// A virtual address within the loaded image.
pub type VAddr = u64;

/// The synthetic node name used for call targets that cannot be statically
/// resolved (indirect calls, computed jumps).
pub const UNRESOLVED: &str = "@unresolved";

/// Formats a virtual address the way every report in this workspace does:
/// `0x` prefixed, lowercase hex, no leading zero padding.
pub fn format_address(addr: VAddr) -> String {
    format!("0x{addr:x}")
}
