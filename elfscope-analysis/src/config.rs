use elfscope_common::Arch;

/// How a tail call is folded into the cumulative stack total. The
/// specification leaves this as an open policy choice; ElfScope fixes it to
/// `ReuseCallerFrame` and records that choice in report metadata rather than
/// alternating between policies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TailCallPolicy {
    /// A tail call contributes `max_total_stack(target)` without adding the
    /// caller's own frame on top of it.
    ReuseCallerFrame,
}

impl TailCallPolicy {
    pub fn metadata_label(self) -> &'static str {
        match self {
            TailCallPolicy::ReuseCallerFrame => "reuse_caller_frame",
        }
    }
}

impl Default for TailCallPolicy {
    fn default() -> Self {
        TailCallPolicy::ReuseCallerFrame
    }
}

/// Tunables threaded through the call analyzer, path finder and stack
/// analyzer. Constructed by the CLI from flags, with architecture-aware
/// defaults; there is no file or environment config layer, since a
/// single-shot CLI tool has nothing to persist between runs.
#[derive(Clone, Copy, Debug)]
pub struct AnalysisConfig {
    /// Bound on recursion unrolling when computing cumulative stack (rule 3
    /// of the stack analyzer contract). Default 10.
    pub recursion_depth: u32,
    /// Constant charged for calls into external/imported/unresolved targets
    /// whose own frame size is unknown.
    pub ext_stack_budget: u64,
    /// Policy for folding tail calls into the cumulative stack total.
    pub tail_call_policy: TailCallPolicy,
    /// Maximum path length (in edges) the path finder will enumerate.
    pub max_path_depth: usize,
    /// Whether a node may be revisited (at most once, no repeated edge)
    /// during path enumeration.
    pub include_cycles: bool,
    /// Whether paths traversing `@unresolved` are included by default.
    pub include_unresolved_paths: bool,
}

impl AnalysisConfig {
    pub const DEFAULT_RECURSION_DEPTH: u32 = 10;
    pub const DEFAULT_MAX_PATH_DEPTH: usize = 64;

    /// Default `ext_stack_budget`: one architecture word times a small
    /// multiplier, covering a minimal external call frame (return address
    /// plus a handful of saved registers) without pretending to know the
    /// callee's real layout.
    pub fn for_arch(arch: Arch) -> Self {
        AnalysisConfig {
            recursion_depth: Self::DEFAULT_RECURSION_DEPTH,
            ext_stack_budget: arch.pointer_size() as u64 * 4,
            tail_call_policy: TailCallPolicy::default(),
            max_path_depth: Self::DEFAULT_MAX_PATH_DEPTH,
            include_cycles: false,
            include_unresolved_paths: false,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig::for_arch(Arch::Amd64)
    }
}
