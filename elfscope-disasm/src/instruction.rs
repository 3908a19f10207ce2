use elfscope_common::VAddr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A normalized operand form. Downstream code never inspects architecture
/// specific operand syntax, only this small shape.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OperandForm {
    Immediate(i64),
    Register,
    Memory,
    Unknown,
}

/// The architecture-independent classification of one instruction, per the
/// disassembler contract.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InstructionClass {
    /// A call with an immediate target operand.
    CallDirect { target: VAddr },
    /// A call through a register or memory operand.
    CallIndirect,
    /// A jump/branch. `tail_candidate` is set by the disassembler when the
    /// branch is unconditional and its target lies outside the function
    /// being decoded — the analyzer decides whether it is actually a tail
    /// call (target is a known function entry or PLT stub) or a plain jump
    /// to an unrecognized destination.
    Branch {
        target: Option<VAddr>,
        conditional: bool,
        tail_candidate: bool,
    },
    /// Returns control to the caller.
    Return,
    /// Adjusts the stack pointer. `delta` is `None` when the adjustment
    /// operand is not a compile-time constant (register-relative `alloca`
    /// style adjustment), which the stack analyzer must treat as unbounded.
    StackAdjust { delta: Option<i64> },
    /// Anything else.
    Other,
}

/// One decoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Instruction {
    pub address: VAddr,
    pub size: u8,
    pub mnemonic: String,
    pub operand: OperandForm,
    pub class: InstructionClass,
}

impl Instruction {
    pub fn is_call(&self) -> bool {
        matches!(
            self.class,
            InstructionClass::CallDirect { .. } | InstructionClass::CallIndirect
        )
    }

    pub fn is_control_flow(&self) -> bool {
        matches!(
            self.class,
            InstructionClass::CallDirect { .. }
                | InstructionClass::CallIndirect
                | InstructionClass::Branch { .. }
                | InstructionClass::Return
        )
    }
}

/// A span of bytes the disassembler could not decode as a valid
/// instruction. Recorded on the owning function; never surfaced as an
/// error, per the error-handling design.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodeGap {
    pub address: VAddr,
    pub length: u64,
}
