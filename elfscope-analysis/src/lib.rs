//! Call-graph construction, path enumeration and stack-consumption analysis
//! on top of a loaded ELF object and its disassembled functions.

mod config;
mod error;
mod graph;
mod paths;
mod stack;

pub use config::{AnalysisConfig, TailCallPolicy};
pub use error::AnalysisError;
pub use graph::{CallEdge, CallGraph, EdgeKind, NodeInfo, NodeKey};
pub use paths::{CallSite, PathFinder, PathRecord, PathSet, PathStatistics, PathStep};
pub use stack::{Confidence, HeavyFunction, StackAnalyzer, StackDistribution, StackFrame, StackReport, StackSummary};
