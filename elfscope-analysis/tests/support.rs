//! Hand-assembled ELF64/x86_64 fixtures for the scenario tests. No
//! toolchain is invoked anywhere in this repository, so every function body
//! below is real machine code written out byte by byte.

const SIZEOF_EHDR: usize = 64;
const SIZEOF_SHDR: usize = 64;
const SIZEOF_SYM: usize = 24;

pub struct FnSpec {
    pub name: &'static str,
    pub address: u64,
    pub code: Vec<u8>,
}

pub fn func(name: &'static str, address: u64, code: Vec<u8>) -> FnSpec {
    FnSpec { name, address, code }
}

/// `sub rsp, imm8` — the only prologue instruction the scenario fixtures
/// use, so the local frame byte count is exactly `imm8`.
pub fn sub_rsp(imm8: u8) -> Vec<u8> {
    vec![0x48, 0x83, 0xEC, imm8]
}

pub fn ret() -> Vec<u8> {
    vec![0xC3]
}

/// `sub rsp, rax` — a register-relative stack adjustment whose size is not a
/// compile-time constant (an `alloca`-style prologue).
pub fn sub_rsp_rax() -> Vec<u8> {
    vec![0x48, 0x29, 0xC4]
}

/// `call rel32` from an instruction at `call_addr` to `target_addr`.
pub fn call_rel32(call_addr: u64, target_addr: u64) -> Vec<u8> {
    let next = call_addr + 5;
    let disp = target_addr as i64 - next as i64;
    let mut v = vec![0xE8];
    v.extend_from_slice(&(disp as i32).to_le_bytes());
    v
}

/// `jmp rel32` — an unconditional tail jump from `jmp_addr` to `target_addr`.
pub fn jmp_rel32(jmp_addr: u64, target_addr: u64) -> Vec<u8> {
    let next = jmp_addr + 5;
    let disp = target_addr as i64 - next as i64;
    let mut v = vec![0xE9];
    v.extend_from_slice(&(disp as i32).to_le_bytes());
    v
}

/// `call rax` — an indirect call with no statically known target.
pub fn call_rax() -> Vec<u8> {
    vec![0xFF, 0xD0]
}

/// Builds a minimal ELF64/x86_64 object: one `.text` section (gaps between
/// functions filled with `nop`) plus a `.symtab`/`.strtab` pair, the same
/// five-section-header layout `elfscope-loader`'s own fixtures use.
pub fn build_elf(text_base: u64, functions: &[FnSpec]) -> Vec<u8> {
    let text_end = functions
        .iter()
        .map(|f| f.address + f.code.len() as u64)
        .max()
        .unwrap_or(text_base);
    let text_size = (text_end - text_base) as usize;
    let mut text = vec![0x90u8; text_size];
    for f in functions {
        let off = (f.address - text_base) as usize;
        text[off..off + f.code.len()].copy_from_slice(&f.code);
    }

    let mut strtab = vec![0u8];
    let mut name_offsets = std::collections::HashMap::new();
    for f in functions {
        name_offsets.insert(f.name, strtab.len() as u32);
        strtab.extend_from_slice(f.name.as_bytes());
        strtab.push(0);
    }

    let mut symtab = vec![0u8; SIZEOF_SYM];
    for f in functions {
        let mut sym = vec![0u8; SIZEOF_SYM];
        sym[0..4].copy_from_slice(&name_offsets[f.name].to_le_bytes());
        sym[4] = 0x02; // STB_LOCAL << 4 | STT_FUNC
        sym[6..8].copy_from_slice(&1u16.to_le_bytes()); // st_shndx = .text
        sym[8..16].copy_from_slice(&f.address.to_le_bytes());
        sym[16..24].copy_from_slice(&(f.code.len() as u64).to_le_bytes());
        symtab.extend_from_slice(&sym);
    }

    let section_names: [&[u8]; 5] = [b"\0", b".text\0", b".symtab\0", b".strtab\0", b".shstrtab\0"];
    let mut shstrtab = Vec::new();
    let mut shstr_off = [0u32; 5];
    for (i, n) in section_names.iter().enumerate() {
        shstr_off[i] = shstrtab.len() as u32;
        shstrtab.extend_from_slice(n);
    }

    let text_off = SIZEOF_EHDR;
    let symtab_off = text_off + text.len();
    let strtab_off = symtab_off + symtab.len();
    let shstrtab_off = strtab_off + strtab.len();
    let shdr_off = shstrtab_off + shstrtab.len();

    let mut buf = Vec::new();
    buf.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    buf.extend_from_slice(&3u16.to_le_bytes()); // e_type = ET_DYN
    buf.extend_from_slice(&0x3eu16.to_le_bytes()); // e_machine = EM_X86_64
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    buf.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    buf.extend_from_slice(&(shdr_off as u64).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    buf.extend_from_slice(&(SIZEOF_EHDR as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
    buf.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
    buf.extend_from_slice(&(SIZEOF_SHDR as u16).to_le_bytes());
    buf.extend_from_slice(&5u16.to_le_bytes()); // e_shnum: NULL + 4 sections
    buf.extend_from_slice(&4u16.to_le_bytes()); // e_shstrndx: .shstrtab
    assert_eq!(buf.len(), SIZEOF_EHDR);

    buf.extend_from_slice(&text);
    buf.extend_from_slice(&symtab);
    buf.extend_from_slice(&strtab);
    buf.extend_from_slice(&shstrtab);

    #[allow(clippy::too_many_arguments)]
    fn push_shdr(
        buf: &mut Vec<u8>,
        name_off: u32,
        sh_type: u32,
        flags: u64,
        addr: u64,
        offset: u64,
        size: u64,
        link: u32,
        info: u32,
        entsize: u64,
    ) {
        buf.extend_from_slice(&name_off.to_le_bytes());
        buf.extend_from_slice(&sh_type.to_le_bytes());
        buf.extend_from_slice(&flags.to_le_bytes());
        buf.extend_from_slice(&addr.to_le_bytes());
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&link.to_le_bytes());
        buf.extend_from_slice(&info.to_le_bytes());
        buf.extend_from_slice(&8u64.to_le_bytes());
        buf.extend_from_slice(&entsize.to_le_bytes());
    }

    push_shdr(&mut buf, shstr_off[0], 0, 0, 0, 0, 0, 0, 0, 0);
    push_shdr(
        &mut buf,
        shstr_off[1],
        1,
        0x6, // SHF_ALLOC | SHF_EXECINSTR
        text_base,
        text_off as u64,
        text.len() as u64,
        0,
        0,
        0,
    );
    push_shdr(
        &mut buf,
        shstr_off[2],
        2, // SHT_SYMTAB
        0,
        0,
        symtab_off as u64,
        symtab.len() as u64,
        3, // sh_link -> .strtab
        (functions.len() + 1) as u32,
        SIZEOF_SYM as u64,
    );
    push_shdr(&mut buf, shstr_off[3], 3, 0, 0, strtab_off as u64, strtab.len() as u64, 0, 0, 0);
    push_shdr(&mut buf, shstr_off[4], 3, 0, 0, shstrtab_off as u64, shstrtab.len() as u64, 0, 0, 0);

    buf
}
