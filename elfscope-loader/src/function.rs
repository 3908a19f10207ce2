use elfscope_common::VAddr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a [`Function`] node was discovered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SymbolKind {
    /// Defined in this object, with known machine code.
    Internal,
    /// Undefined here; resolved against a shared library at load time.
    Imported,
    /// The synthetic `@unresolved` sink for indirect/unrecoverable call
    /// targets. There is at most one such node per [`crate::LoadedObject`].
    SyntheticUnresolved,
}

/// A callable entity in the binary: a defined function, an imported symbol,
/// or the synthetic unresolved sink.
///
/// Identity is the virtual address for internal functions and the name for
/// imports and the unresolved sink (see the data model invariants in the
/// specification). Two symbols that alias the same address collapse into one
/// `Function` whose `aliases` records the alternate names.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Function {
    /// Best-effort demangled name, falling back to the raw symbol name.
    pub name: String,
    /// The name exactly as it appears in the symbol table.
    pub raw_name: String,
    /// Alternate names that alias the same address.
    pub aliases: Vec<String>,
    /// Virtual address, meaningless for imports (always 0) and unresolved.
    pub address: VAddr,
    /// Size in bytes, as recorded or inferred (see [`crate::elf::load`]).
    pub size: u64,
    pub kind: SymbolKind,
    /// Name of the section this function's code lives in, if any.
    pub section: Option<String>,
}

impl Function {
    pub fn is_internal(&self) -> bool {
        self.kind == SymbolKind::Internal
    }

    pub fn is_unresolved(&self) -> bool {
        self.kind == SymbolKind::SyntheticUnresolved
    }

    /// The identity used to key this function in the call graph: the
    /// address for internal functions, the name otherwise.
    pub fn graph_key(&self) -> FunctionKey {
        match self.kind {
            SymbolKind::Internal => FunctionKey::Address(self.address),
            SymbolKind::Imported | SymbolKind::SyntheticUnresolved => {
                FunctionKey::Name(self.name.clone())
            }
        }
    }
}

/// The identity of a [`Function`] node, used as a graph key.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum FunctionKey {
    Address(VAddr),
    Name(String),
}

/// A symbol naming an external (imported) function with no local definition.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Import {
    pub name: String,
}

/// A retained ELF section, as described in the loader contract.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Section {
    pub name: String,
    pub address: VAddr,
    pub offset: u64,
    pub size: u64,
    pub executable: bool,
}

impl Section {
    pub fn contains(&self, addr: VAddr) -> bool {
        addr >= self.address && addr < self.address.saturating_add(self.size)
    }
}
