//! ElfScope recovers an inter-procedural call graph from a static ELF
//! binary and derives call-path enumeration and per-function worst-case
//! stack analysis on top of it. This crate is a thin facade bundling the
//! pipeline's stages into one dependency:
//!
//! - [`common`] — architecture/endianness types and the memory-mapped
//!   [`common::ByteView`] every other stage borrows from.
//! - [`loader`] — parses the ELF file into a [`loader::LoadedObject`].
//! - [`disasm`] — lazily disassembles one function's bytes into
//!   [`disasm::Instruction`]s, classified by architecture-specific mnemonic
//!   tables.
//! - [`analysis`] — builds the [`analysis::CallGraph`], enumerates call
//!   paths with [`analysis::PathFinder`] and computes cumulative stack
//!   consumption with [`analysis::StackAnalyzer`].
//!
//! # Usage
//!
//! ```no_run
//! use elfscope::{analysis, common, disasm, loader};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let object = loader::LoadedObject::open("/bin/ls")?;
//! let disassembler = disasm::Disassembler::new(object.architecture, object.endianness)?;
//! let graph = analysis::CallGraph::build(&object, &disassembler)?;
//!
//! let config = analysis::AnalysisConfig::for_arch(object.architecture);
//! let stack = analysis::StackAnalyzer::new(&graph, config);
//! let report = stack.function_stack("main")?;
//! println!("main: {} bytes worst case", report.max_total_stack);
//! # let _ = common::Arch::Amd64;
//! # Ok(())
//! # }
//! ```
//!
//! Enable the `serde` feature to derive `Serialize`/`Deserialize` on every
//! report type, matching the JSON shapes the CLI emits.

#[doc(inline)]
pub use elfscope_common as common;
#[doc(inline)]
pub use elfscope_disasm as disasm;
#[doc(inline)]
pub use elfscope_loader as loader;

#[doc(inline)]
pub use elfscope_analysis as analysis;
