//! Wraps `capstone` behind the architecture-independent [`Instruction`]
//! model, with a lazy, write-once per-function decode cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use capstone::prelude::*;
use capstone::Capstone;
use once_cell_regex::hex_target_regex;
use regex::Regex;

use elfscope_common::{Arch, Endianness, VAddr};

use crate::error::DisasmError;
use crate::instruction::{DecodeGap, Instruction, InstructionClass, OperandForm};
use crate::mnemonics::{self, MnemonicTable};

/// The decoded instruction stream and any gaps for one function.
#[derive(Debug, Default)]
pub struct FunctionDisassembly {
    pub instructions: Vec<Instruction>,
    pub gaps: Vec<DecodeGap>,
}

/// Decodes machine code into [`Instruction`]s for one architecture.
///
/// One `Disassembler` is built per loaded object and reused across every
/// function in it; its decode cache is a field with the same lifetime as
/// the value itself; there is no global or static mutable state.
#[derive(Debug)]
pub struct Disassembler {
    arch: Arch,
    cs: Capstone,
    table: &'static MnemonicTable,
    cache: RefCell<HashMap<VAddr, Rc<FunctionDisassembly>>>,
}

impl Disassembler {
    pub fn new(arch: Arch, endianness: Endianness) -> Result<Self, DisasmError> {
        let cs = build_capstone(arch, endianness)?;
        Ok(Self {
            arch,
            cs,
            table: mnemonics::table_for(arch),
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Decodes `code` (the raw bytes of one function) starting at
    /// `base_address`, returning a cached, shared result. `function_end` is
    /// `base_address + code.len()`, used to flag tail-call candidates: an
    /// unconditional branch whose target falls outside `[base_address,
    /// function_end)`.
    pub fn decode(&self, base_address: VAddr, code: &[u8]) -> Rc<FunctionDisassembly> {
        if let Some(hit) = self.cache.borrow().get(&base_address) {
            return hit.clone();
        }

        let result = Rc::new(self.decode_uncached(base_address, code));
        self.cache
            .borrow_mut()
            .insert(base_address, result.clone());
        result
    }

    fn decode_uncached(&self, base_address: VAddr, code: &[u8]) -> FunctionDisassembly {
        let function_end = base_address + code.len() as u64;
        let align = self.arch.instruction_alignment().max(1);

        let mut instructions = Vec::new();
        let mut gaps = Vec::new();
        let mut offset = 0usize;

        while offset < code.len() {
            let addr = base_address + offset as u64;
            match self.cs.disasm_all(&code[offset..], addr) {
                Ok(insns) if !insns.is_empty() => {
                    for insn in insns.iter() {
                        let size = insn.bytes().len();
                        let mnemonic = insn.mnemonic().unwrap_or("").to_ascii_lowercase();
                        let op_str = insn.op_str().unwrap_or("").trim();
                        let class = classify(self.arch, self.table, &mnemonic, op_str, insn.address(), function_end);
                        let operand = operand_form(op_str);
                        instructions.push(Instruction {
                            address: insn.address(),
                            size: size as u8,
                            mnemonic,
                            operand,
                            class,
                        });
                    }
                    let last = insns.iter().last().expect("checked non-empty above");
                    let consumed = (last.address() - base_address) as usize + last.bytes().len();
                    offset = consumed.max(offset + 1);
                }
                _ => {
                    let remaining = (code.len() - offset) as u64;
                    let length = align.min(remaining).max(1);
                    gaps.push(DecodeGap { address: addr, length });
                    tracing::debug!(address = %elfscope_common::format_address(addr), "decode gap");
                    offset += length as usize;
                }
            }
        }

        FunctionDisassembly { instructions, gaps }
    }
}

fn operand_form(op_str: &str) -> OperandForm {
    if op_str.is_empty() {
        return OperandForm::Unknown;
    }
    if let Some(imm) = parse_hex_target(op_str) {
        return OperandForm::Immediate(imm as i64);
    }
    if op_str.contains('[') || op_str.contains('(') {
        return OperandForm::Memory;
    }
    OperandForm::Register
}

/// Parses a branch/call operand string down to a single target address, if
/// it is a bare immediate (`0x401020`, `#0x401020`, or a lone decimal). Any
/// operand with commas, register names, or memory brackets is not a
/// constant target.
fn parse_hex_target(op_str: &str) -> Option<u64> {
    if !hex_target_regex().is_match(op_str) {
        return None;
    }
    let trimmed = op_str.trim_start_matches('#');
    if let Some(hex) = trimmed.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse().ok()
    }
}

fn classify(
    arch: Arch,
    table: &MnemonicTable,
    mnemonic: &str,
    op_str: &str,
    address: VAddr,
    function_end: VAddr,
) -> InstructionClass {
    if table.is_call(mnemonic) {
        return match parse_hex_target(op_str) {
            Some(target) => InstructionClass::CallDirect { target },
            None => InstructionClass::CallIndirect,
        };
    }

    if is_return(table, mnemonic, op_str) {
        return InstructionClass::Return;
    }

    if table.is_unconditional_branch(mnemonic) {
        let target = parse_hex_target(op_str);
        let tail_candidate = matches!(target, Some(t) if t < address || t >= function_end);
        return InstructionClass::Branch {
            target,
            conditional: false,
            tail_candidate,
        };
    }

    if table.is_conditional_branch(mnemonic) {
        return InstructionClass::Branch {
            target: parse_hex_target(op_str),
            conditional: true,
            tail_candidate: false,
        };
    }

    if table.is_stack_adjust(mnemonic) {
        return InstructionClass::StackAdjust {
            delta: stack_delta(arch, mnemonic, op_str),
        };
    }

    InstructionClass::Other
}

fn is_return(table: &MnemonicTable, mnemonic: &str, op_str: &str) -> bool {
    if !table.is_return_mnemonic(mnemonic) {
        return false;
    }
    // `bx`/`jr` are overloaded as plain indirect branches unless their
    // operand is specifically the link register.
    match mnemonic {
        "bx" => op_str == "lr",
        "jr" => op_str == "$ra" || op_str == "ra",
        _ => true,
    }
}

/// Best-effort recovery of the constant delta a prologue-style instruction
/// applies to the stack pointer, in bytes lowered (positive = grows down).
/// `None` means the adjustment is present but not a compile-time constant.
///
/// `sub`/`add`/`addi`/store-with-update forms are also used for ordinary
/// arithmetic and local stores against any register, so each is gated on its
/// destination operand actually naming the stack pointer; only then is the
/// immediate trusted as a frame-size delta.
fn stack_delta(arch: Arch, mnemonic: &str, op_str: &str) -> Option<i64> {
    let word = arch.pointer_size() as i64;
    match mnemonic {
        "push" => Some(word),
        "pop" => Some(-word),
        "sub" | "subs" if arithmetic_dest_is_sp(arch, op_str) => last_immediate(op_str),
        "add" | "adds" if arithmetic_dest_is_sp(arch, op_str) => last_immediate(op_str).map(|v| -v),
        "addi" | "addiu" | "daddiu" if arithmetic_dest_is_sp(arch, op_str) => last_immediate(op_str).map(|v| -v),
        "stwu" | "stdu" if store_base_is_sp(arch, op_str) => last_immediate(op_str).map(|v| -v),
        "stp" | "str" | "stur" if store_base_is_sp(arch, op_str) => last_immediate(op_str).map(|v| -v),
        "enter" => last_immediate(op_str),
        "leave" => None,
        _ => None,
    }
}

/// Whether `op_str`'s destination (first) operand names the stack-pointer
/// register for `arch`, e.g. `rsp` in `"rsp, 0x28"`. Used for arithmetic
/// adjustments (`sub`/`add`/`addi`-family), where the adjusted register is
/// the instruction's first operand. Only the destination is checked, so
/// `sub rbp, rsp` (destination `rbp`) is correctly rejected even though
/// `rsp` appears in the operand string.
fn arithmetic_dest_is_sp(arch: Arch, op_str: &str) -> bool {
    let dest = op_str.split(',').next().unwrap_or("").trim();
    sp_register_matches(arch, dest)
}

/// Whether the base register of the last memory operand in `op_str` names
/// the stack pointer. Used for store-with-update forms (`stwu`/`stdu`, the
/// AArch64 `stp`/`str`/`stur` pre/post-index forms) where the adjusted
/// register is the addressing-mode base, not the stored value, e.g. `r1` in
/// `"r1, -48(r1)"` or `sp` in `"x29, x30, [sp, -16]!"`.
fn store_base_is_sp(arch: Arch, op_str: &str) -> bool {
    sp_register_matches(arch, &base_register_operand(op_str))
}

fn sp_register_matches(arch: Arch, reg: &str) -> bool {
    match arch {
        Arch::X86 | Arch::Amd64 => matches!(reg, "sp" | "esp" | "rsp"),
        Arch::Arm | Arch::Arm64 => reg == "sp",
        Arch::Mips | Arch::Mips64 => reg == "sp" || reg == "$sp",
        Arch::Ppc | Arch::Ppc64 => reg == "r1" || reg == "sp",
        Arch::Riscv32 | Arch::Riscv64 => reg == "sp",
        Arch::Unknown => reg.contains("sp"),
        _ => unreachable!("Arch is non_exhaustive but all known variants are matched"),
    }
}

/// Extracts the base register named inside the last `[...]`/`(...)` group in
/// an operand string, e.g. `"r1, -48(r1)"` -> `"r1"`, `"x29, x30, [sp,
/// -16]!"` -> `"sp"`. Empty if `op_str` has no bracketed memory operand.
fn base_register_operand(op_str: &str) -> String {
    let open = op_str.rfind(['[', '(']);
    let close = op_str.rfind([']', ')']);
    let inner = match (open, close) {
        (Some(o), Some(c)) if o < c => &op_str[o + 1..c],
        _ => return String::new(),
    };
    inner.split(',').next().unwrap_or("").trim().to_string()
}

/// Extracts the last signed decimal/hex immediate in an operand string,
/// e.g. `rsp, 0x28` -> `0x28`, `sp, sp, #-16` -> `-16`, `-48(r1)` -> `-48`.
fn last_immediate(op_str: &str) -> Option<i64> {
    let token = op_str
        .split(|c: char| c == ',' || c == ' ')
        .filter(|t| !t.is_empty())
        .last()?;
    // Drop a trailing `(base_reg)` (PowerPC store-with-update addressing),
    // then a trailing `]`/`!` (AArch64 pre/post-index writeback).
    let token = token.split('(').next().unwrap_or(token);
    let token = token
        .trim_start_matches('#')
        .trim_end_matches(|c: char| c == ']' || c == '!');
    let (sign, token) = match token.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, token),
    };
    let value = if let Some(hex) = token.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        token.parse::<i64>().ok()?
    };
    Some(sign * value)
}

fn build_capstone(arch: Arch, endianness: Endianness) -> Result<Capstone, DisasmError> {
    let endian = match endianness {
        Endianness::Little => capstone::Endian::Little,
        Endianness::Big => capstone::Endian::Big,
    };

    let cs = match arch {
        Arch::X86 => Capstone::new()
            .x86()
            .mode(arch::x86::ArchMode::Mode32)
            .syntax(arch::x86::ArchSyntax::Intel)
            .build(),
        Arch::Amd64 => Capstone::new()
            .x86()
            .mode(arch::x86::ArchMode::Mode64)
            .syntax(arch::x86::ArchSyntax::Intel)
            .build(),
        Arch::Arm => Capstone::new().arm().mode(arch::arm::ArchMode::Arm).build(),
        Arch::Arm64 => Capstone::new()
            .arm64()
            .mode(arch::arm64::ArchMode::Arm)
            .build(),
        Arch::Mips => Capstone::new()
            .mips()
            .mode(arch::mips::ArchMode::Mips32)
            .endian(endian)
            .build(),
        Arch::Mips64 => Capstone::new()
            .mips()
            .mode(arch::mips::ArchMode::Mips64)
            .endian(endian)
            .build(),
        Arch::Ppc => Capstone::new()
            .ppc()
            .mode(arch::ppc::ArchMode::Mode32)
            .endian(endian)
            .build(),
        Arch::Ppc64 => Capstone::new()
            .ppc()
            .mode(arch::ppc::ArchMode::Mode64)
            .endian(endian)
            .build(),
        Arch::Riscv32 => Capstone::new()
            .riscv()
            .mode(arch::riscv::ArchMode::RiscV32)
            .build(),
        Arch::Riscv64 => Capstone::new()
            .riscv()
            .mode(arch::riscv::ArchMode::RiscV64)
            .build(),
        Arch::Unknown => return Err(DisasmError::UnsupportedArch(arch)),
        _ => unreachable!("Arch is non_exhaustive but all known variants are matched"),
    };

    cs.map_err(|e| DisasmError::BackendInit(e.to_string()))
}

mod once_cell_regex {
    use super::Regex;
    use std::sync::OnceLock;

    pub fn hex_target_regex() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"^#?-?(0x[0-9a-fA-F]+|[0-9]+)$").unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_call_targets() {
        assert_eq!(parse_hex_target("0x401020"), Some(0x401020));
        assert_eq!(parse_hex_target("#0x1040"), Some(0x1040));
        assert_eq!(parse_hex_target("rax"), None);
        assert_eq!(parse_hex_target("qword ptr [rax + 8]"), None);
    }

    #[test]
    fn extracts_stack_adjust_immediates() {
        assert_eq!(last_immediate("rsp, 0x28"), Some(0x28));
        assert_eq!(last_immediate("sp, sp, #-0x10"), Some(-0x10));
        assert_eq!(last_immediate("sp, sp, #16"), Some(16));
        assert_eq!(last_immediate("r1, -48(r1)"), Some(-48));
        assert_eq!(last_immediate("x29, x30, [sp, -16]!"), Some(-16));
    }

    #[test]
    fn classifies_direct_call_and_return() {
        let table = mnemonics::table_for(Arch::Amd64);
        assert_eq!(
            classify(Arch::Amd64, table, "call", "0x401030", 0x1000, 0x1010),
            InstructionClass::CallDirect { target: 0x401030 }
        );
        assert_eq!(
            classify(Arch::Amd64, table, "ret", "", 0x1000, 0x1010),
            InstructionClass::Return
        );
    }

    #[test]
    fn unconditional_branch_outside_function_is_tail_candidate() {
        let table = mnemonics::table_for(Arch::Amd64);
        let class = classify(Arch::Amd64, table, "jmp", "0x500000", 0x1000, 0x1010);
        assert_eq!(
            class,
            InstructionClass::Branch {
                target: Some(0x500000),
                conditional: false,
                tail_candidate: true,
            }
        );
    }

    #[test]
    fn sub_rsp_is_a_stack_adjust_but_sub_into_other_register_is_not() {
        let table = mnemonics::table_for(Arch::Amd64);
        assert_eq!(
            classify(Arch::Amd64, table, "sub", "rsp, 0x10", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: Some(0x10) }
        );
        assert_eq!(
            classify(Arch::Amd64, table, "sub", "eax, 0x10", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: None }
        );
        assert_eq!(
            classify(Arch::Amd64, table, "add", "rbx, 8", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: None }
        );
    }

    #[test]
    fn mips_store_update_forms_require_sp_destination() {
        let table = mnemonics::table_for(Arch::Mips);
        assert_eq!(
            classify(Arch::Mips, table, "addiu", "$sp, $sp, -32", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: Some(32) }
        );
        assert_eq!(
            classify(Arch::Mips, table, "addiu", "$t0, $t1, -32", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: None }
        );
    }

    #[test]
    fn arm64_stp_prologue_requires_sp_base_but_ppc_stwu_requires_r1_base() {
        let arm64 = mnemonics::table_for(Arch::Arm64);
        assert_eq!(
            classify(Arch::Arm64, arm64, "stp", "x29, x30, [sp, -16]!", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: Some(16) }
        );
        assert_eq!(
            classify(Arch::Arm64, arm64, "str", "w0, [x1, 4]", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: None }
        );

        let ppc = mnemonics::table_for(Arch::Ppc);
        assert_eq!(
            classify(Arch::Ppc, ppc, "stwu", "r1, -48(r1)", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: Some(48) }
        );
        assert_eq!(
            classify(Arch::Ppc, ppc, "stwu", "r31, -16(r3)", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: None }
        );
    }

    #[test]
    fn push_and_pop_scale_to_the_architecture_word_size() {
        let table = mnemonics::table_for(Arch::X86);
        assert_eq!(
            classify(Arch::X86, table, "push", "ebp", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: Some(4) }
        );
        let table64 = mnemonics::table_for(Arch::Amd64);
        assert_eq!(
            classify(Arch::Amd64, table64, "push", "rbp", 0x1000, 0x1010),
            InstructionClass::StackAdjust { delta: Some(8) }
        );
    }
}
