//! Architecture descriptors.
//!
//! ElfScope parameterizes both the disassembler and the stack analyzer by a
//! small per-architecture data table instead of dispatching through trait
//! objects per backend. Adding an architecture is a data change here, plus a
//! mnemonic table in `elfscope-disasm`.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A CPU architecture recognized by the loader and disassembler.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum Arch {
    X86,
    Amd64,
    Arm,
    Arm64,
    Mips,
    Mips64,
    Ppc,
    Ppc64,
    Riscv32,
    Riscv64,
    Unknown,
}

impl Arch {
    /// Native pointer / general-purpose register width in bytes.
    pub fn pointer_size(self) -> usize {
        match self {
            Arch::X86 | Arch::Arm | Arch::Mips | Arch::Ppc | Arch::Riscv32 => 4,
            Arch::Amd64 | Arch::Arm64 | Arch::Mips64 | Arch::Ppc64 | Arch::Riscv64 => 8,
            Arch::Unknown => 8,
        }
    }

    /// Instruction alignment in bytes, used to resynchronize the decoder
    /// after a [`DecodeGap`](elfscope-disasm's gap type) on fixed-width ISAs.
    /// Variable-length ISAs (x86) return 1.
    pub fn instruction_alignment(self) -> u64 {
        match self {
            Arch::X86 | Arch::Amd64 => 1,
            Arch::Arm => 2, // Thumb-capable; conservative minimum
            Arch::Arm64 => 4,
            Arch::Mips | Arch::Mips64 | Arch::Ppc | Arch::Riscv32 => 4,
            Arch::Ppc64 => 4,
            Arch::Riscv64 => 2, // compressed instructions (RVC) are 2 bytes
            Arch::Unknown => 1,
        }
    }

    /// Whether this architecture is natively little-endian, as opposed to
    /// bi-endian (ARM/MIPS/PPC) or always-big-endian encodings. This is only
    /// a fallback default: [`Endianness`] detected from the ELF header wins.
    pub fn default_endianness(self) -> Endianness {
        match self {
            Arch::Ppc | Arch::Ppc64 => Endianness::Big,
            _ => Endianness::Little,
        }
    }

    pub fn is_64_bit(self) -> bool {
        self.pointer_size() == 8
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Arch::X86 => "x86",
            Arch::Amd64 => "x86_64",
            Arch::Arm => "arm",
            Arch::Arm64 => "aarch64",
            Arch::Mips => "mips",
            Arch::Mips64 => "mips64",
            Arch::Ppc => "powerpc",
            Arch::Ppc64 => "powerpc64",
            Arch::Riscv32 => "riscv32",
            Arch::Riscv64 => "riscv64",
            Arch::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Byte order of multi-byte values in the binary.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Endianness {
    Little,
    Big,
}

/// Bit width of the object's address space.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Bitness {
    Bits32,
    Bits64,
}

impl Bitness {
    pub fn from_is_64(is_64: bool) -> Self {
        if is_64 {
            Bitness::Bits64
        } else {
            Bitness::Bits32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_sizes_match_known_abis() {
        assert_eq!(Arch::X86.pointer_size(), 4);
        assert_eq!(Arch::Amd64.pointer_size(), 8);
        assert_eq!(Arch::Arm64.pointer_size(), 8);
        assert_eq!(Arch::Mips.pointer_size(), 4);
    }

    #[test]
    fn ppc_defaults_to_big_endian() {
        assert_eq!(Arch::Ppc.default_endianness(), Endianness::Big);
        assert_eq!(Arch::Amd64.default_endianness(), Endianness::Little);
    }
}
