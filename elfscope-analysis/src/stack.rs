//! Local-frame recovery and the memoized worst-case cumulative stack
//! traversal over the SCC-condensed call graph (§4.5).

use std::cell::RefCell;
use std::collections::HashMap;

use elfscope_disasm::{Instruction, InstructionClass};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::graph::{CallGraph, EdgeKind, NodeKey};

/// Result of scanning one function's decoded instructions for its own
/// stack-frame footprint, before any call is taken into account.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFrame {
    pub bytes: u64,
    pub dynamic_alloca: bool,
}

/// How a [`StackFrame`]'s byte count was obtained. ElfScope never has a CFI
/// or DWARF backend, so `Exact` is reserved for a future collaborator (see
/// the design notes) and never produced here.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Confidence {
    Exact,
    Heuristic,
    Unknown,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StackFrame {
    pub function: String,
    pub local_frame_bytes: u64,
    pub dynamic_alloca: bool,
    pub confidence: Confidence,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StackReport {
    pub function: String,
    pub local_stack_frame: u64,
    pub stack_consumed_by_calls: u64,
    pub max_total_stack: u64,
    pub max_stack_call_path: Vec<String>,
    pub is_recursive: bool,
    pub frame: StackFrame,
}

#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StackDistribution {
    pub small: usize,
    pub medium: usize,
    pub large: usize,
    pub huge: usize,
}

impl StackDistribution {
    fn bucket(&mut self, total: u64) {
        match total {
            0..=63 => self.small += 1,
            64..=255 => self.medium += 1,
            256..=1023 => self.large += 1,
            _ => self.huge += 1,
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeavyFunction {
    pub function: String,
    pub max_total_stack: u64,
    pub max_stack_call_path: Vec<String>,
    pub stack_ratio: f64,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StackSummary {
    pub architecture: String,
    pub total_functions_analyzed: usize,
    pub max_total_stack_consumption: u64,
    pub function_with_max_total_stack: String,
    pub max_total_stack_call_path: Vec<String>,
    pub stack_distribution: StackDistribution,
    pub heavy_functions: Vec<HeavyFunction>,
    pub tail_call_policy: &'static str,
}

/// Scans one function's instructions for its local stack-frame footprint:
/// the running cumulative stack-pointer delta, tracking the deepest point
/// reached over the recognized prologue window (push/sub-sp/frame-setup
/// move) and, in the same pass, over the whole function body so a `sub sp,
/// imm` placed mid-body (not just in the prologue) is still counted. A
/// non-constant adjustment anywhere marks the frame `dynamic_alloca` and the
/// byte count is reported as the conservative constant zero.
pub(crate) fn scan_local_frame(instructions: &[Instruction]) -> LocalFrame {
    let mut in_prologue = true;
    let mut running: i64 = 0;
    let mut max_running: i64 = 0;
    let mut prologue_max: i64 = 0;
    let mut dynamic = false;

    for insn in instructions {
        match &insn.class {
            InstructionClass::StackAdjust { delta: None } => dynamic = true,
            InstructionClass::StackAdjust { delta: Some(delta) } => {
                running += delta;
                max_running = max_running.max(running);
                if in_prologue {
                    prologue_max = prologue_max.max(running);
                }
            }
            _ if in_prologue && !is_prologue_neutral(insn) => in_prologue = false,
            _ => {}
        }
    }

    if dynamic {
        return LocalFrame {
            bytes: 0,
            dynamic_alloca: true,
        };
    }

    LocalFrame {
        bytes: prologue_max.max(max_running).max(0) as u64,
        dynamic_alloca: false,
    }
}

/// A frame-setup instruction that doesn't itself move the stack pointer by a
/// constant (so isn't `StackAdjust`) but also doesn't end the prologue
/// window: establishing a frame pointer (`mov rbp, rsp`, `mov fp, sp`).
fn is_prologue_neutral(insn: &Instruction) -> bool {
    insn.mnemonic.starts_with("mov")
}

/// Computes, per function, the prologue-scanned local frame plus the
/// worst-case cumulative stack along reachable call chains (§4.5). One
/// analyzer is built per graph and caches results for the graph's lifetime.
pub struct StackAnalyzer<'g> {
    graph: &'g CallGraph,
    config: AnalysisConfig,
    cache: RefCell<HashMap<NodeKey, (u64, Vec<String>)>>,
}

impl<'g> StackAnalyzer<'g> {
    pub fn new(graph: &'g CallGraph, config: AnalysisConfig) -> Self {
        StackAnalyzer {
            graph,
            config,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn function_stack(&self, name: &str) -> Result<StackReport, AnalysisError> {
        let key = self
            .graph
            .resolve_name(name)
            .ok_or_else(|| AnalysisError::UnknownFunction(name.to_string()))?;
        let info = self
            .graph
            .node(&key)
            .ok_or_else(|| AnalysisError::UnknownFunction(name.to_string()))?;

        let (max_total_stack, path) = self.total_stack(&key);
        let local = info.local_frame;

        // §4.5: a dynamic SP adjustment (the size couldn't be resolved to a
        // compile-time constant) marks the frame's confidence `unknown`;
        // otherwise the prologue scan is trusted as a heuristic estimate.
        // ElfScope has no CFI/DWARF backend, so `Confidence::Exact` is never
        // produced here.
        let confidence = if info.dynamic_alloca {
            Confidence::Unknown
        } else {
            Confidence::Heuristic
        };

        Ok(StackReport {
            function: info.name.clone(),
            local_stack_frame: local,
            stack_consumed_by_calls: max_total_stack.saturating_sub(local),
            max_total_stack,
            max_stack_call_path: path,
            is_recursive: self.graph.is_recursive(&key),
            frame: StackFrame {
                function: info.name.clone(),
                local_frame_bytes: local,
                dynamic_alloca: info.dynamic_alloca,
                confidence,
            },
        })
    }

    pub fn summary(&self, top_k: usize) -> StackSummary {
        let mut reports: Vec<StackReport> = self
            .graph
            .internal_functions()
            .map(|info| self.function_stack(&info.name).expect("internal function always resolves"))
            .collect();
        reports.sort_by(|a, b| b.max_total_stack.cmp(&a.max_total_stack).then(a.function.cmp(&b.function)));

        let mut distribution = StackDistribution::default();
        for report in &reports {
            distribution.bucket(report.max_total_stack);
        }

        let max_report = reports.first();
        let max_total = max_report.map(|r| r.max_total_stack).unwrap_or(0);

        let heavy_functions = reports
            .iter()
            .take(top_k)
            .map(|r| HeavyFunction {
                function: r.function.clone(),
                max_total_stack: r.max_total_stack,
                max_stack_call_path: r.max_stack_call_path.clone(),
                stack_ratio: if max_total == 0 {
                    0.0
                } else {
                    r.max_total_stack as f64 / max_total as f64
                },
            })
            .collect();

        StackSummary {
            architecture: String::new(),
            total_functions_analyzed: reports.len(),
            max_total_stack_consumption: max_total,
            function_with_max_total_stack: max_report.map(|r| r.function.clone()).unwrap_or_default(),
            max_total_stack_call_path: max_report.map(|r| r.max_stack_call_path.clone()).unwrap_or_default(),
            stack_distribution: distribution,
            heavy_functions,
            tail_call_policy: self.config.tail_call_policy.metadata_label(),
        }
    }

    fn total_stack(&self, key: &NodeKey) -> (u64, Vec<String>) {
        if let Some(hit) = self.cache.borrow().get(key) {
            return hit.clone();
        }

        let result = if self.graph.is_recursive(key) {
            self.total_stack_recursive(key)
        } else {
            self.total_stack_acyclic(key)
        };

        self.cache.borrow_mut().insert(key.clone(), result.clone());
        result
    }

    /// Rule 2: `local(F) + max over outgoing edges of the edge's
    /// contribution`, where a tail edge contributes the callee's own total
    /// without adding `F`'s frame, and an edge into a non-internal node
    /// (imported/unresolved/external) contributes the configured budget.
    fn total_stack_acyclic(&self, key: &NodeKey) -> (u64, Vec<String>) {
        let info = self.graph.node(key).expect("node exists");
        let local = info.local_frame;

        let mut best_total = local;
        let mut best_path = vec![info.name.clone()];

        for edge in self.graph.callees(key) {
            let target_info = self.graph.node(&edge.to).expect("edge target registered");
            let (target_total, target_path) = if target_info.is_internal {
                self.total_stack(&edge.to)
            } else {
                (self.config.ext_stack_budget, vec![target_info.name.clone()])
            };

            let candidate_total = match edge.kind {
                EdgeKind::Tail => target_total,
                _ => local.saturating_add(target_total),
            };

            if candidate_total > best_total {
                best_total = candidate_total;
                best_path = std::iter::once(info.name.clone()).chain(target_path).collect();
            }
        }

        (best_total, best_path)
    }

    /// Rule 3: bounded-unrolling recursion heuristic. A self-loop (singleton
    /// SCC) unrolls `R` identical invocations of its own frame. A
    /// multi-member SCC unrolls `R` copies of the worst local frame found in
    /// the cycle, plus one guaranteed frame for the queried function itself
    /// (distinguishing it from the generic per-hop estimate). Either way, a
    /// successor that escapes the SCC entirely adds its own total on top.
    fn total_stack_recursive(&self, key: &NodeKey) -> (u64, Vec<String>) {
        let info = self.graph.node(key).expect("node exists");
        let scc_id = self.graph.scc_of(key);
        let members: &[NodeKey] = scc_id
            .map(|id| self.graph.sccs()[id].as_slice())
            .unwrap_or(std::slice::from_ref(key));

        let r = self.config.recursion_depth as u64;
        let base = if members.len() <= 1 {
            r.saturating_mul(info.local_frame)
        } else {
            let worst_local = members
                .iter()
                .filter_map(|m| self.graph.node(m))
                .map(|n| n.local_frame)
                .max()
                .unwrap_or(info.local_frame);
            r.saturating_mul(worst_local).saturating_add(info.local_frame)
        };

        let mut best_escape: Option<(u64, Vec<String>)> = None;
        for member in members {
            for edge in self.graph.callees(member) {
                if self.graph.scc_of(&edge.to) == scc_id {
                    continue; // stays inside the recursive group, not an escape
                }
                let target_info = self.graph.node(&edge.to).expect("edge target registered");
                let (total, path) = if target_info.is_internal {
                    self.total_stack(&edge.to)
                } else {
                    (self.config.ext_stack_budget, vec![target_info.name.clone()])
                };
                let better = best_escape.as_ref().map(|(best, _)| total > *best).unwrap_or(true);
                if better {
                    best_escape = Some((total, path));
                }
            }
        }

        let marker = format!("{} (recursion \u{d7} {})", info.name, r);
        let mut path = vec![info.name.clone(), marker];
        let total = match best_escape {
            Some((escape_total, escape_path)) => {
                path.extend(escape_path);
                base.saturating_add(escape_total)
            }
            None => base,
        };

        (total, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elfscope_common::VAddr;
    use elfscope_disasm::OperandForm;

    fn stack_adjust(addr: VAddr, delta: i64) -> Instruction {
        Instruction {
            address: addr,
            size: 4,
            mnemonic: "sub".to_string(),
            operand: OperandForm::Immediate(delta),
            class: InstructionClass::StackAdjust { delta: Some(delta) },
        }
    }

    fn frame_setup_mov(addr: VAddr) -> Instruction {
        Instruction {
            address: addr,
            size: 3,
            mnemonic: "mov".to_string(),
            operand: OperandForm::Register,
            class: InstructionClass::Other,
        }
    }

    fn other(addr: VAddr, mnemonic: &str) -> Instruction {
        Instruction {
            address: addr,
            size: 3,
            mnemonic: mnemonic.to_string(),
            operand: OperandForm::Unknown,
            class: InstructionClass::Other,
        }
    }

    #[test]
    fn prologue_window_reports_the_deepest_push() {
        let insns = vec![frame_setup_mov(0x1000), stack_adjust(0x1003, 16), other(0x1007, "nop")];
        let frame = scan_local_frame(&insns);
        assert_eq!(frame.bytes, 16);
        assert!(!frame.dynamic_alloca);
    }

    #[test]
    fn mid_body_sub_sp_is_still_counted() {
        let insns = vec![
            stack_adjust(0x1000, 16),
            other(0x1004, "call"),
            stack_adjust(0x1008, 32),
        ];
        let frame = scan_local_frame(&insns);
        assert_eq!(frame.bytes, 48);
    }

    #[test]
    fn dynamic_adjustment_disables_the_byte_count() {
        let insns = vec![Instruction {
            address: 0x1000,
            size: 3,
            mnemonic: "sub".to_string(),
            operand: OperandForm::Register,
            class: InstructionClass::StackAdjust { delta: None },
        }];
        let frame = scan_local_frame(&insns);
        assert!(frame.dynamic_alloca);
        assert_eq!(frame.bytes, 0);
    }
}
