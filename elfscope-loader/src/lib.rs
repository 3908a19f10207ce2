//! The ELF symbol/section extractor: the leaf stage of the ElfScope
//! pipeline. Opens a binary, validates it, identifies its architecture, and
//! yields an owned [`LoadedObject`] with a function table the disassembler
//! and call analyzer build on.

mod elf;
mod error;
mod function;

pub use elf::LoadedObject;
pub use error::LoaderError;
pub use function::{Function, FunctionKey, Import, Section, SymbolKind};


#[cfg(test)]
mod test_support {
    //! A hand-assembled, minimal ELF64 binary builder shared by this crate's
    //! and downstream crates' tests. No compiler or linker is invoked here;
    //! every byte is placed explicitly, keeping fixtures small and fixed in
    //! size.

    pub fn build_tiny_elf() -> Vec<u8> {
        build_with_functions(&[("main", 0x1000, 16), ("helper", 0x1010, 8)])
    }

    /// Builds a tiny ELF64/x86_64 object whose `.text` section holds
    /// `functions` (name, address, size), each body filled with `nop` (0x90)
    /// padding followed by a `ret` (0xc3) so the disassembler has something
    /// real to decode.
    pub fn build_with_functions(functions: &[(&str, u64, u64)]) -> Vec<u8> {
        const TEXT_VADDR: u64 = 0x1000;

        let text_size: u64 = functions
            .iter()
            .map(|(_, addr, size)| (addr - TEXT_VADDR) + size)
            .max()
            .unwrap_or(0);
        let mut text = vec![0x90u8; text_size as usize];
        for (_, addr, size) in functions {
            let offset = (addr - TEXT_VADDR) as usize;
            if *size > 0 {
                text[offset + *size as usize - 1] = 0xc3; // ret
            }
        }

        let mut strtab: Vec<u8> = vec![0];
        let mut name_offsets = Vec::new();
        for (name, ..) in functions {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }

        let shstrtab_names = [".text", ".symtab", ".strtab", ".shstrtab"];
        let mut shstrtab: Vec<u8> = vec![0];
        let mut shname_offsets = Vec::new();
        for name in shstrtab_names {
            shname_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }

        // Layout: ehdr | text | symtab | strtab | shstrtab | shdrs
        const EHDR_SIZE: u64 = 64;
        let text_off = EHDR_SIZE;
        let symtab_off = text_off + text.len() as u64;

        let sym_size = 24u64; // Elf64_Sym
        let mut symtab = Vec::new();
        symtab.extend_from_slice(&[0u8; 24]); // null symbol
        for (i, (_, addr, size)) in functions.iter().enumerate() {
            let mut sym = Vec::with_capacity(24);
            sym.extend_from_slice(&name_offsets[i].to_le_bytes()); // st_name
            sym.push(0x02); // st_info: STT_FUNC | STB_LOCAL<<4 => (0<<4)|2
            sym.push(0); // st_other
            sym.extend_from_slice(&1u16.to_le_bytes()); // st_shndx = 1 (.text)
            sym.extend_from_slice(&addr.to_le_bytes());
            sym.extend_from_slice(&size.to_le_bytes());
            symtab.extend_from_slice(&sym);
        }

        let strtab_off = symtab_off + symtab.len() as u64;
        let shstrtab_off = strtab_off + strtab.len() as u64;
        let shdr_off = shstrtab_off + shstrtab.len() as u64;

        let mut out = Vec::new();
        // e_ident
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
        out.push(2); // ELFCLASS64
        out.push(1); // ELFDATA2LSB
        out.push(1); // EV_CURRENT
        out.extend_from_slice(&[0u8; 9]); // padding
        out.extend_from_slice(&3u16.to_le_bytes()); // e_type = ET_DYN
        out.extend_from_slice(&0x3eu16.to_le_bytes()); // e_machine = EM_X86_64
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
        out.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
        out.extend_from_slice(&shdr_off.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&EHDR_SIZE.to_le_bytes()[..2]); // e_ehsize (u16)
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
        out.extend_from_slice(&5u16.to_le_bytes()); // e_shnum: NULL + 4 sections
        out.extend_from_slice(&4u16.to_le_bytes()); // e_shstrndx: .shstrtab
        assert_eq!(out.len() as u64, EHDR_SIZE);

        out.extend_from_slice(&text);
        out.extend_from_slice(&symtab);
        out.extend_from_slice(&strtab);
        out.extend_from_slice(&shstrtab);

        let push_shdr = |out: &mut Vec<u8>,
                         name: u32,
                         kind: u32,
                         flags: u64,
                         addr: u64,
                         offset: u64,
                         size: u64,
                         link: u32,
                         entsize: u64| {
            out.extend_from_slice(&name.to_le_bytes());
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&addr.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&link.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // sh_info
            out.extend_from_slice(&1u64.to_le_bytes()); // sh_addralign
            out.extend_from_slice(&entsize.to_le_bytes());
        };

        // SHT_NULL
        push_shdr(&mut out, 0, 0, 0, 0, 0, 0, 0, 0);
        // .text: SHT_PROGBITS=1, SHF_ALLOC|SHF_EXECINSTR = 0x6
        push_shdr(
            &mut out,
            shname_offsets[0],
            1,
            0x6,
            TEXT_VADDR,
            text_off,
            text.len() as u64,
            0,
            0,
        );
        // .symtab: SHT_SYMTAB=2, link=.strtab index (3)
        push_shdr(
            &mut out,
            shname_offsets[1],
            2,
            0,
            0,
            symtab_off,
            symtab.len() as u64,
            3,
            sym_size,
        );
        // .strtab: SHT_STRTAB=3
        push_shdr(
            &mut out,
            shname_offsets[2],
            3,
            0,
            0,
            strtab_off,
            strtab.len() as u64,
            0,
            0,
        );
        // .shstrtab: SHT_STRTAB=3
        push_shdr(
            &mut out,
            shname_offsets[3],
            3,
            0,
            0,
            shstrtab_off,
            shstrtab.len() as u64,
            0,
            0,
        );

        out
    }
}
