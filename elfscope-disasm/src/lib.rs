//! Architecture-independent disassembly on top of `capstone`.
//!
//! Callers build one [`Disassembler`] per loaded object's architecture and
//! feed it the raw bytes of each function; the result is a flat
//! [`Instruction`] stream plus any [`DecodeGap`]s, never raw capstone types.

mod disasm;
mod error;
mod instruction;
mod mnemonics;

pub use disasm::{Disassembler, FunctionDisassembly};
pub use error::DisasmError;
pub use instruction::{DecodeGap, Instruction, InstructionClass, OperandForm};
pub use mnemonics::{table_for, MnemonicTable};

#[cfg(test)]
mod tests {
    use super::*;
    use elfscope_common::{Arch, Endianness};

    /// `mov eax, 1; ret` as raw x86_64 bytes.
    const MOV_RET: &[u8] = &[0xb8, 0x01, 0x00, 0x00, 0x00, 0xc3];

    /// `call rel32` to an address outside this 6-byte function, followed by
    /// a direct call back into it, then `ret`.
    fn call_then_ret() -> Vec<u8> {
        let mut code = vec![0xe8, 0x00, 0x00, 0x00, 0x00]; // call +0
        code.push(0xc3); // ret
        code
    }

    #[test]
    fn decodes_a_simple_function() {
        let cs = Disassembler::new(Arch::Amd64, Endianness::Little).expect("build capstone");
        let decoded = cs.decode(0x1000, MOV_RET);
        assert!(decoded.gaps.is_empty());
        assert_eq!(decoded.instructions.last().unwrap().class, InstructionClass::Return);
    }

    #[test]
    fn classifies_a_direct_call() {
        let cs = Disassembler::new(Arch::Amd64, Endianness::Little).expect("build capstone");
        let code = call_then_ret();
        let decoded = cs.decode(0x2000, &code);
        let call = &decoded.instructions[0];
        assert!(call.is_call());
        match call.class {
            InstructionClass::CallDirect { target } => assert_eq!(target, 0x2000 + 5),
            ref other => panic!("expected a direct call, got {other:?}"),
        }
    }

    #[test]
    fn decode_results_are_cached_by_address() {
        let cs = Disassembler::new(Arch::Amd64, Endianness::Little).expect("build capstone");
        let first = cs.decode(0x1000, MOV_RET);
        let second = cs.decode(0x1000, MOV_RET);
        assert!(std::rc::Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn invalid_bytes_are_recorded_as_gaps_not_errors() {
        let cs = Disassembler::new(Arch::Amd64, Endianness::Little).expect("build capstone");
        let mut code = vec![0xff]; // incomplete/invalid opcode byte on its own
        code.extend_from_slice(MOV_RET);
        let decoded = cs.decode(0x3000, &code);
        assert!(!decoded.gaps.is_empty());
        assert!(decoded
            .instructions
            .iter()
            .any(|i| i.class == InstructionClass::Return));
    }

    #[test]
    fn unsupported_architecture_is_rejected_up_front() {
        let err = Disassembler::new(Arch::Unknown, Endianness::Little).unwrap_err();
        assert!(matches!(err, DisasmError::UnsupportedArch(Arch::Unknown)));
    }
}
