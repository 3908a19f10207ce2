//! ELF parsing: validates the magic, identifies the architecture, and
//! produces the function table the rest of the pipeline analyzes.

use std::collections::{BTreeMap, HashMap};

use goblin::elf::{header, section_header, sym, Elf};

use elfscope_common::{Arch, Bitness, ByteView, Endianness, VAddr};

use crate::error::LoaderError;
use crate::function::{Function, Import, Section, SymbolKind};

/// EABI64 flag bits that mark a MIPS object as targeting the 64-bit ABI even
/// though `e_machine` alone is ambiguous between MIPS32 and MIPS64.
const EF_MIPS_ABI_O64: u32 = 0x0000_2000;
const EF_MIPS_ABI_EABI64: u32 = 0x0000_4000;
const MIPS_64_FLAGS: u32 = EF_MIPS_ABI_O64 | EF_MIPS_ABI_EABI64;

/// Default size, in bytes, of one PLT entry, used only to recover the
/// stub-address-to-imported-name mapping heuristically from relocation
/// order (see [`plt_stub_map`]).
const DEFAULT_PLT_ENTRY_SIZE: u64 = 16;

/// The fully parsed, self-contained result of loading one ELF object.
///
/// Unlike `goblin::elf::Elf`, this does not borrow from the input buffer:
/// every field is owned, so the value can outlive the mapped file and be
/// passed freely between pipeline stages.
#[derive(Debug)]
pub struct LoadedObject {
    pub architecture: Arch,
    pub bitness: Bitness,
    pub endianness: Endianness,
    pub entry_point: VAddr,
    pub sections: Vec<Section>,
    /// Internal and imported functions plus the synthetic unresolved sink,
    /// sorted by address (imports and the sink sort after all internals).
    pub functions: Vec<Function>,
    pub imports: Vec<Import>,
    /// PLT stub virtual address -> imported symbol name.
    pub plt_stubs: BTreeMap<VAddr, String>,
    data: ByteView<'static>,
}

impl LoadedObject {
    /// Loads and validates an ELF file from `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, LoaderError> {
        let data = ByteView::open(path)?;
        Self::parse(data)
    }

    /// Parses an ELF object already resident in memory.
    pub fn parse(data: ByteView<'static>) -> Result<Self, LoaderError> {
        if data.len() < header::header32::SIZEOF_EHDR || &data[..4] != header::ELFMAG {
            return Err(LoaderError::NotAnElf);
        }

        let elf = Elf::parse(&data).map_err(|e| LoaderError::TruncatedFile(e.to_string()))?;

        let architecture = map_architecture_sized(elf.header.e_machine, elf.header.e_flags, elf.is_64)
            .ok_or(LoaderError::UnsupportedArch(elf.header.e_machine))?;
        let bitness = Bitness::from_is_64(elf.is_64);
        let endianness = if elf.little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        };

        let sections = collect_sections(&elf);
        let (functions, imports) = collect_functions(&elf, &sections);
        let plt_stubs = plt_stub_map(&elf, architecture);

        tracing::debug!(
            arch = %architecture,
            functions = functions.len(),
            imports = imports.len(),
            plt_stubs = plt_stubs.len(),
            "loaded ELF object",
        );

        Ok(LoadedObject {
            architecture,
            bitness,
            endianness,
            entry_point: elf.entry,
            sections,
            functions,
            imports,
            plt_stubs,
            data,
        })
    }

    /// Raw file bytes, for the disassembler to slice function bodies out of.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the bytes of `section_name`, if the section was retained.
    pub fn section_bytes(&self, section_name: &str) -> Option<&[u8]> {
        let section = self.sections.iter().find(|s| s.name == section_name)?;
        self.bytes_at(section.offset, section.size)
    }

    /// Returns up to `size` bytes starting at file offset `offset`.
    pub fn bytes_at(&self, offset: u64, size: u64) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        let len = usize::try_from(size).ok()?;
        self.data.get(start..start.checked_add(len)?)
    }

    /// Looks up a function by its demangled or raw name.
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.name == name || f.raw_name == name || f.aliases.iter().any(|a| a == name))
    }

    /// Rewrites a direct-call target address to the imported symbol name if
    /// it lands inside a PLT stub, per the loader contract.
    pub fn resolve_plt_target(&self, addr: VAddr) -> Option<&str> {
        self.plt_stubs.get(&addr).map(String::as_str)
    }
}

fn map_architecture(machine: u16, e_flags: u32) -> Option<Arch> {
    use header::*;
    Some(match machine {
        EM_386 => Arch::X86,
        EM_X86_64 => Arch::Amd64,
        EM_ARM => Arch::Arm,
        EM_AARCH64 => Arch::Arm64,
        EM_MIPS | EM_MIPS_RS3_LE => {
            if e_flags & MIPS_64_FLAGS != 0 {
                Arch::Mips64
            } else {
                Arch::Mips
            }
        }
        EM_PPC => Arch::Ppc,
        EM_PPC64 => Arch::Ppc64,
        EM_RISCV => {
            // e_machine alone does not distinguish RV32 from RV64; the ELF
            // class (the same bit the caller uses for `Bitness`) does.
            return None; // resolved by the caller via `map_architecture_sized`
        }
        _ => return None,
    })
}

fn map_architecture_sized(machine: u16, e_flags: u32, is_64: bool) -> Option<Arch> {
    if machine == header::EM_RISCV {
        return Some(if is_64 { Arch::Riscv64 } else { Arch::Riscv32 });
    }
    map_architecture(machine, e_flags)
}

fn collect_sections(elf: &Elf<'_>) -> Vec<Section> {
    let mut sections = Vec::with_capacity(elf.section_headers.len());
    for header in &elf.section_headers {
        if header.sh_type == section_header::SHT_NULL {
            continue;
        }
        let name = elf
            .shdr_strtab
            .get_at(header.sh_name)
            .unwrap_or("")
            .to_string();
        sections.push(Section {
            name,
            address: header.sh_addr,
            offset: header.sh_offset,
            size: header.sh_size,
            executable: header.is_executable(),
        });
    }
    sections
}

/// A function symbol as seen in a symbol table, before alias collapsing.
struct RawSymbol {
    name: String,
    address: VAddr,
    size: u64,
    defined: bool,
    imported_weak_or_global: bool,
}

fn raw_symbols(elf: &Elf<'_>) -> Vec<RawSymbol> {
    let mut out = Vec::new();
    for (table, strtab) in [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)] {
        for sym in table.iter() {
            if sym.st_type() != sym::STT_FUNC {
                continue;
            }
            let name = match strtab.get_at(sym.st_name) {
                Some(n) if !n.is_empty() => n.to_string(),
                _ => continue,
            };
            out.push(RawSymbol {
                name,
                address: sym.st_value,
                size: sym.st_size,
                defined: sym.st_shndx != 0,
                imported_weak_or_global: matches!(sym.st_bind(), sym::STB_GLOBAL | sym::STB_WEAK),
            });
        }
    }
    out
}

fn collect_functions(elf: &Elf<'_>, sections: &[Section]) -> (Vec<Function>, Vec<Import>) {
    let exec_sections: Vec<&Section> = sections.iter().filter(|s| s.executable).collect();

    let mut by_address: BTreeMap<VAddr, Function> = BTreeMap::new();
    let mut imports: HashMap<String, Import> = HashMap::new();

    for raw in raw_symbols(elf) {
        if !raw.defined {
            if raw.imported_weak_or_global {
                imports
                    .entry(raw.name.clone())
                    .or_insert_with(|| Import { name: raw.name });
            }
            continue;
        }

        // A size-0 function symbol is only kept if it actually points into
        // an executable section; its extent is fixed up in a second pass.
        let in_exec_section = exec_sections.iter().any(|s| s.contains(raw.address));
        if raw.size == 0 && !in_exec_section {
            continue;
        }

        let section_name = sections
            .iter()
            .find(|s| s.contains(raw.address))
            .map(|s| s.name.clone());

        let name = demangle(&raw.name);

        by_address
            .entry(raw.address)
            .and_modify(|existing| {
                if !existing.aliases.contains(&raw.name) && existing.raw_name != raw.name {
                    existing.aliases.push(raw.name.clone());
                }
            })
            .or_insert_with(|| Function {
                name,
                raw_name: raw.name,
                aliases: Vec::new(),
                address: raw.address,
                size: raw.size,
                kind: SymbolKind::Internal,
                section: section_name,
            });
    }

    fix_up_zero_sizes(&mut by_address, &exec_sections);

    let mut functions: Vec<Function> = by_address.into_values().collect();
    functions.sort_by_key(|f| f.address);

    let mut import_list: Vec<Import> = imports.into_values().collect();
    import_list.sort_by(|a, b| a.name.cmp(&b.name));

    for import in &import_list {
        functions.push(Function {
            name: demangle(&import.name),
            raw_name: import.name.clone(),
            aliases: Vec::new(),
            address: 0,
            size: 0,
            kind: SymbolKind::Imported,
            section: None,
        });
    }

    functions.push(Function {
        name: elfscope_common::UNRESOLVED.to_string(),
        raw_name: elfscope_common::UNRESOLVED.to_string(),
        aliases: Vec::new(),
        address: 0,
        size: 0,
        kind: SymbolKind::SyntheticUnresolved,
        section: None,
    });

    (functions, import_list)
}

/// Gives size-0 function symbols an extent running to the next known
/// boundary: the next function in the same section, or the section's end.
fn fix_up_zero_sizes(by_address: &mut BTreeMap<VAddr, Function>, exec_sections: &[&Section]) {
    let addresses: Vec<VAddr> = by_address.keys().copied().collect();
    for (i, addr) in addresses.iter().enumerate() {
        let needs_fixup = by_address.get(addr).map(|f| f.size == 0).unwrap_or(false);
        if !needs_fixup {
            continue;
        }
        let section_end = exec_sections
            .iter()
            .find(|s| s.contains(*addr))
            .map(|s| s.address + s.size);
        let next_addr = addresses.get(i + 1).copied();
        let bound = match (next_addr, section_end) {
            (Some(n), Some(e)) => n.min(e),
            (Some(n), None) => n,
            (None, Some(e)) => e,
            (None, None) => *addr,
        };
        if let Some(f) = by_address.get_mut(addr) {
            f.size = bound.saturating_sub(*addr);
        }
    }
}

fn demangle(raw: &str) -> String {
    if let Ok(sym) = rustc_demangle::try_demangle(raw) {
        return sym.to_string();
    }
    if let Ok(sym) = cpp_demangle::Symbol::new(raw.as_bytes()) {
        if let Ok(demangled) = sym.demangle(&Default::default()) {
            return demangled;
        }
    }
    raw.to_string()
}

/// Heuristically recovers `plt_stub_address -> imported_name` from the PLT
/// relocation order: entry 0 of `.plt` is the lazy-binding resolver stub, so
/// relocation `i` (0-indexed) corresponds to the stub at `plt_base +
/// (i + 1) * entry_size`. This holds for the common lazy-PLT layout on
/// x86/x86_64/arm/aarch64; other architectures fall back to the same
/// convention, which may be imprecise for IRELATIVE-heavy objects.
fn plt_stub_map(elf: &Elf<'_>, arch: Arch) -> BTreeMap<VAddr, String> {
    let mut map = BTreeMap::new();

    let plt = match elf
        .section_headers
        .iter()
        .find(|s| elf.shdr_strtab.get_at(s.sh_name) == Some(".plt"))
    {
        Some(p) => p,
        None => return map,
    };

    let entry_size = plt_entry_size(arch);
    let strtab = &elf.dynstrtab;
    let dynsyms: Vec<_> = elf.dynsyms.iter().collect();

    for (i, reloc) in elf.pltrelocs.iter().enumerate() {
        let name = dynsyms
            .get(reloc.r_sym)
            .and_then(|sym| strtab.get_at(sym.st_name));
        if let Some(name) = name {
            let stub_addr = plt.sh_addr + entry_size * (i as u64 + 1);
            map.insert(stub_addr, name.to_string());
        }
    }

    map
}

fn plt_entry_size(arch: Arch) -> u64 {
    match arch {
        Arch::Arm => 12,
        _ => DEFAULT_PLT_ENTRY_SIZE,
    }
}
