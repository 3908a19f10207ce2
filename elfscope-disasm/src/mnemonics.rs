//! Per-architecture mnemonic classification tables.
//!
//! An "architecture descriptor": the disassembler and (indirectly, via
//! [`crate::instruction::Instruction`]) the stack analyzer are parameterized
//! by this data rather than by a trait object per backend. Adding an
//! architecture means adding one table here.

use elfscope_common::Arch;

/// The mnemonic sets one backend supplies, used to classify a decoded
/// instruction without inspecting raw operand bytes.
#[derive(Debug)]
pub struct MnemonicTable {
    /// Mnemonics that transfer control with an implicit return address
    /// (calls). Direct vs. indirect is then decided from the operand text.
    pub calls: &'static [&'static str],
    /// Unconditional jumps/branches. A subset of these become tail-call
    /// candidates when their target falls outside the current function.
    pub unconditional_branches: &'static [&'static str],
    /// Exact-match conditional branch mnemonics (architectures whose
    /// condition is a mnemonic suffix are matched with a prefix check
    /// instead, see [`classify_branch`]).
    pub conditional_branches: &'static [&'static str],
    /// Mnemonics that return control to the caller.
    pub returns: &'static [&'static str],
    /// Mnemonics that may adjust the stack pointer by a constant amount
    /// (pushes, immediate sub/add, store-with-update forms).
    pub stack_adjust: &'static [&'static str],
    /// Prefix used for architectures that encode the branch condition as a
    /// mnemonic suffix (ARM `beq`, AArch64 `b.eq`, PowerPC `beq`, MIPS
    /// `beq`). Empty string disables prefix-based conditional detection.
    pub conditional_branch_prefix: &'static str,
}

pub fn table_for(arch: Arch) -> &'static MnemonicTable {
    match arch {
        Arch::X86 | Arch::Amd64 => &X86,
        Arch::Arm => &ARM,
        Arch::Arm64 => &ARM64,
        Arch::Mips | Arch::Mips64 => &MIPS,
        Arch::Ppc | Arch::Ppc64 => &PPC,
        Arch::Riscv32 | Arch::Riscv64 => &RISCV,
        Arch::Unknown => &X86,
        _ => unreachable!("Arch is non_exhaustive but all known variants are matched"),
    }
}

static X86: MnemonicTable = MnemonicTable {
    calls: &["call", "callq"],
    unconditional_branches: &["jmp", "jmpq"],
    conditional_branches: &[
        "je", "jne", "jz", "jnz", "ja", "jae", "jb", "jbe", "jg", "jge", "jl", "jle", "jo", "jno",
        "js", "jns", "jp", "jnp", "jpe", "jpo", "jcxz", "jecxz", "jrcxz",
    ],
    returns: &["ret", "retq", "retn"],
    stack_adjust: &["push", "pop", "sub", "add", "enter", "leave"],
    conditional_branch_prefix: "",
};

static ARM: MnemonicTable = MnemonicTable {
    calls: &["bl", "blx"],
    unconditional_branches: &["b", "bx"],
    conditional_branches: &[],
    returns: &["bx"], // specifically `bx lr`, see `classify_return`
    stack_adjust: &["push", "pop", "sub", "add", "stmdb", "ldmia", "stmfd"],
    conditional_branch_prefix: "b",
};

static ARM64: MnemonicTable = MnemonicTable {
    calls: &["bl", "blr"],
    unconditional_branches: &["b", "br"],
    conditional_branches: &["cbz", "cbnz", "tbz", "tbnz"],
    returns: &["ret"],
    stack_adjust: &["sub", "add", "stp", "ldp", "str", "stur"],
    conditional_branch_prefix: "b.",
};

static MIPS: MnemonicTable = MnemonicTable {
    calls: &["jal", "jalr"],
    unconditional_branches: &["j", "b"],
    conditional_branches: &[
        "beq", "bne", "bgez", "bgtz", "blez", "bltz", "beqz", "bnez", "bgt", "blt",
    ],
    returns: &["jr"], // specifically `jr $ra`, see `classify_return`
    stack_adjust: &["addiu", "addi", "daddiu", "sw", "sd"],
    conditional_branch_prefix: "",
};

static PPC: MnemonicTable = MnemonicTable {
    calls: &["bl"],
    unconditional_branches: &["b"],
    conditional_branches: &[
        "beq", "bne", "blt", "bge", "bgt", "ble", "bdnz", "bdz", "bso", "bns",
    ],
    returns: &["blr"],
    stack_adjust: &["stwu", "stdu", "addi"],
    conditional_branch_prefix: "",
};

static RISCV: MnemonicTable = MnemonicTable {
    calls: &["jal", "jalr"],
    unconditional_branches: &["j", "jr"],
    conditional_branches: &["beq", "bne", "blt", "bge", "bltu", "bgeu", "beqz", "bnez"],
    returns: &["ret"],
    stack_adjust: &["addi", "sd", "sw", "c.addi", "c.sdsp", "c.swsp"],
    conditional_branch_prefix: "",
};

impl MnemonicTable {
    pub fn is_call(&self, mnemonic: &str) -> bool {
        self.calls.contains(&mnemonic)
    }

    pub fn is_unconditional_branch(&self, mnemonic: &str) -> bool {
        self.unconditional_branches.contains(&mnemonic)
    }

    pub fn is_conditional_branch(&self, mnemonic: &str) -> bool {
        if self.conditional_branches.contains(&mnemonic) {
            return true;
        }
        let prefix = self.conditional_branch_prefix;
        !prefix.is_empty()
            && mnemonic.starts_with(prefix)
            && mnemonic.len() > prefix.len()
            && !self.unconditional_branches.contains(&mnemonic)
            && !self.calls.contains(&mnemonic)
    }

    pub fn is_return_mnemonic(&self, mnemonic: &str) -> bool {
        self.returns.contains(&mnemonic)
    }

    pub fn is_stack_adjust(&self, mnemonic: &str) -> bool {
        self.stack_adjust.contains(&mnemonic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_classifies_conditional_jumps() {
        let t = table_for(Arch::Amd64);
        assert!(t.is_conditional_branch("jne"));
        assert!(!t.is_conditional_branch("jmp"));
        assert!(t.is_unconditional_branch("jmp"));
    }

    #[test]
    fn arm64_suffix_conditionals_are_recognized() {
        let t = table_for(Arch::Arm64);
        assert!(t.is_conditional_branch("b.eq"));
        assert!(!t.is_conditional_branch("bl"));
        assert!(!t.is_conditional_branch("b"));
    }

    #[test]
    fn ppc_prefix_does_not_misclassify_bl_or_blr() {
        let t = table_for(Arch::Ppc);
        assert!(t.is_call("bl"));
        assert!(t.is_return_mnemonic("blr"));
    }
}
