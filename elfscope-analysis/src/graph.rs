//! The call graph: an owned adjacency structure (spec design note — no
//! third-party graph crate), built once per analyzed object and read-only
//! afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use elfscope_common::{format_address, VAddr, UNRESOLVED};
use elfscope_disasm::{Disassembler, InstructionClass};
use elfscope_loader::{Function, FunctionKey, LoadedObject};

use crate::error::AnalysisError;
use crate::stack::{self, LocalFrame};

/// Identity of one call-graph node: an internal/imported/unresolved
/// function, or a synthetic external-address sink created on the fly for a
/// direct call whose target has no owning function.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    Function(FunctionKey),
    External(VAddr),
}

impl NodeKey {
    fn external_name(addr: VAddr) -> String {
        format!("@external:{}", format_address(addr))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Copy)]
pub enum EdgeKind {
    Direct,
    Indirect,
    Tail,
    Plt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEdge {
    pub from: NodeKey,
    pub to: NodeKey,
    pub site: VAddr,
    pub callee_address: Option<VAddr>,
    pub kind: EdgeKind,
}

#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub key: NodeKey,
    pub name: String,
    pub is_internal: bool,
    pub local_frame: u64,
    pub dynamic_alloca: bool,
}

/// The directed call multigraph plus its precomputed strongly-connected
/// components. Frozen once built: every method here is `&self`.
pub struct CallGraph {
    nodes: BTreeMap<NodeKey, NodeInfo>,
    out_edges: BTreeMap<NodeKey, Vec<CallEdge>>,
    in_edges: BTreeMap<NodeKey, BTreeSet<NodeKey>>,
    name_index: BTreeMap<String, NodeKey>,
    sccs: Vec<Vec<NodeKey>>,
    scc_of: HashMap<NodeKey, usize>,
}

impl CallGraph {
    /// Builds the graph from every internal function's decoded instruction
    /// stream. Functions are processed in address order so that repeated
    /// runs over the same input produce byte-identical results (§5).
    pub fn build(object: &LoadedObject, disasm: &Disassembler) -> Result<Self, AnalysisError> {
        let mut nodes = BTreeMap::new();
        let mut name_index = BTreeMap::new();

        for f in &object.functions {
            let key = NodeKey::Function(f.graph_key());
            index_name(&mut name_index, &f.name, &key);
            index_name(&mut name_index, &f.raw_name, &key);
            for alias in &f.aliases {
                index_name(&mut name_index, alias, &key);
            }
            nodes.insert(
                key.clone(),
                NodeInfo {
                    key,
                    name: f.name.clone(),
                    is_internal: f.is_internal(),
                    local_frame: 0,
                    dynamic_alloca: false,
                },
            );
        }

        let mut by_start: BTreeMap<VAddr, &Function> = BTreeMap::new();
        for f in object.functions.iter().filter(|f| f.is_internal()) {
            by_start.insert(f.address, f);
        }

        let mut out_edges: BTreeMap<NodeKey, Vec<CallEdge>> = BTreeMap::new();
        let mut in_edges: BTreeMap<NodeKey, BTreeSet<NodeKey>> = BTreeMap::new();

        let mut internals: Vec<&Function> = object.functions.iter().filter(|f| f.is_internal()).collect();
        internals.sort_by_key(|f| f.address);

        for f in internals {
            let key = NodeKey::Function(f.graph_key());
            let code = function_bytes(object, f).unwrap_or(&[]);
            let decoded = disasm.decode(f.address, code);

            let LocalFrame { bytes, dynamic_alloca } = stack::scan_local_frame(&decoded.instructions);
            if let Some(info) = nodes.get_mut(&key) {
                info.local_frame = bytes;
                info.dynamic_alloca = dynamic_alloca;
            }

            for insn in &decoded.instructions {
                let (to, kind, callee_address) = match &insn.class {
                    InstructionClass::CallDirect { target } => {
                        let (to, kind) = resolve(object, &by_start, *target, &mut nodes);
                        (to, kind, Some(*target))
                    }
                    InstructionClass::CallIndirect => (unresolved_key(), EdgeKind::Indirect, None),
                    InstructionClass::Branch {
                        target: Some(target),
                        conditional: false,
                        tail_candidate: true,
                    } => {
                        let (to, _) = resolve(object, &by_start, *target, &mut nodes);
                        (to, EdgeKind::Tail, Some(*target))
                    }
                    InstructionClass::Branch {
                        target: None,
                        conditional: false,
                        tail_candidate: true,
                    } => (unresolved_key(), EdgeKind::Tail, None),
                    _ => continue,
                };

                let edge = CallEdge {
                    from: key.clone(),
                    to: to.clone(),
                    site: insn.address,
                    callee_address,
                    kind,
                };
                out_edges.entry(key.clone()).or_default().push(edge);
                in_edges.entry(to).or_default().insert(key.clone());
            }
        }

        // Every node must have an (possibly empty) adjacency entry so
        // lookups never distinguish "no edges" from "unknown node".
        for key in nodes.keys() {
            out_edges.entry(key.clone()).or_default();
            in_edges.entry(key.clone()).or_default();
        }

        let (sccs, scc_of) = tarjan_scc(&nodes, &out_edges);

        Ok(CallGraph {
            nodes,
            out_edges,
            in_edges,
            name_index,
            sccs,
            scc_of,
        })
    }

    pub fn node(&self, key: &NodeKey) -> Option<&NodeInfo> {
        self.nodes.get(key)
    }

    pub fn resolve_name(&self, name: &str) -> Option<NodeKey> {
        self.name_index.get(name).cloned()
    }

    pub fn callees(&self, key: &NodeKey) -> &[CallEdge] {
        self.out_edges.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn callers(&self, key: &NodeKey) -> impl Iterator<Item = &NodeKey> {
        self.in_edges.get(key).into_iter().flatten()
    }

    pub fn functions(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    pub fn internal_functions(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values().filter(|n| n.is_internal)
    }

    /// Functions with no internal caller: entry points for source-omitted
    /// path enumeration (§4.4).
    pub fn roots(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.keys().filter(move |k| {
            self.in_edges
                .get(*k)
                .map(|callers| callers.iter().all(|c| !self.node(c).map(|n| n.is_internal).unwrap_or(false)))
                .unwrap_or(true)
        })
    }

    pub fn is_recursive(&self, key: &NodeKey) -> bool {
        let self_loop = self
            .out_edges
            .get(key)
            .map(|edges| edges.iter().any(|e| &e.to == key))
            .unwrap_or(false);
        if self_loop {
            return true;
        }
        self.scc_of
            .get(key)
            .map(|&id| self.sccs[id].len() > 1)
            .unwrap_or(false)
    }

    pub fn scc_of(&self, key: &NodeKey) -> Option<usize> {
        self.scc_of.get(key).copied()
    }

    pub fn sccs(&self) -> &[Vec<NodeKey>] {
        &self.sccs
    }

    /// Non-trivial SCCs only (size > 1 or a self-loop), for summary
    /// statistics on recursion.
    pub fn cycles(&self) -> Vec<&[NodeKey]> {
        self.sccs
            .iter()
            .filter(|members| members.len() > 1 || self.is_recursive(&members[0]))
            .map(Vec::as_slice)
            .collect()
    }
}

fn index_name(index: &mut BTreeMap<String, NodeKey>, name: &str, key: &NodeKey) {
    index.entry(name.to_string()).or_insert_with(|| key.clone());
}

fn unresolved_key() -> NodeKey {
    NodeKey::Function(FunctionKey::Name(UNRESOLVED.to_string()))
}

/// Resolves a direct-call or tail-call-branch target to a graph node,
/// rewriting calls through a PLT stub to the imported symbol (§4.3) and
/// falling back to a synthetic `@external:<hex>` node for addresses with no
/// owning function, inserting it into `nodes` on first use.
fn resolve(
    object: &LoadedObject,
    by_start: &BTreeMap<VAddr, &Function>,
    target: VAddr,
    nodes: &mut BTreeMap<NodeKey, NodeInfo>,
) -> (NodeKey, EdgeKind) {
    if let Some(raw_name) = object.resolve_plt_target(target) {
        if let Some(f) = object.function_by_name(raw_name) {
            return (NodeKey::Function(f.graph_key()), EdgeKind::Plt);
        }
    }

    if let Some((_, f)) = by_start.range(..=target).next_back() {
        if target < f.address + f.size.max(1) {
            return (NodeKey::Function(f.graph_key()), EdgeKind::Direct);
        }
    }

    let key = NodeKey::External(target);
    nodes.entry(key.clone()).or_insert_with(|| NodeInfo {
        key: key.clone(),
        name: NodeKey::external_name(target),
        is_internal: false,
        local_frame: 0,
        dynamic_alloca: false,
    });
    (key, EdgeKind::Direct)
}

fn function_bytes<'a>(object: &'a LoadedObject, f: &Function) -> Option<&'a [u8]> {
    let section_name = f.section.as_deref()?;
    let section = object.sections.iter().find(|s| s.name == section_name)?;
    let file_offset = section.offset + (f.address - section.address);
    object.bytes_at(file_offset, f.size)
}

/// Tarjan's strongly-connected-components algorithm over the out-edge
/// adjacency, iterative to avoid recursion-depth limits on pathological
/// inputs with very long call chains.
fn tarjan_scc(
    nodes: &BTreeMap<NodeKey, NodeInfo>,
    out_edges: &BTreeMap<NodeKey, Vec<CallEdge>>,
) -> (Vec<Vec<NodeKey>>, HashMap<NodeKey, usize>) {
    struct State {
        index: HashMap<NodeKey, usize>,
        lowlink: HashMap<NodeKey, usize>,
        on_stack: HashMap<NodeKey, bool>,
        stack: Vec<NodeKey>,
        next_index: usize,
        sccs: Vec<Vec<NodeKey>>,
    }

    enum Frame {
        Enter(NodeKey),
        Finish(NodeKey),
    }

    let mut state = State {
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashMap::new(),
        stack: Vec::new(),
        next_index: 0,
        sccs: Vec::new(),
    };

    for start in nodes.keys() {
        if state.index.contains_key(start) {
            continue;
        }

        let mut work = vec![Frame::Enter(start.clone())];
        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(v) => {
                    if state.index.contains_key(&v) {
                        continue;
                    }
                    state.index.insert(v.clone(), state.next_index);
                    state.lowlink.insert(v.clone(), state.next_index);
                    state.next_index += 1;
                    state.stack.push(v.clone());
                    state.on_stack.insert(v.clone(), true);

                    work.push(Frame::Finish(v.clone()));
                    if let Some(edges) = out_edges.get(&v) {
                        for edge in edges {
                            if !state.index.contains_key(&edge.to) {
                                work.push(Frame::Enter(edge.to.clone()));
                            }
                        }
                    }
                }
                Frame::Finish(v) => {
                    if let Some(edges) = out_edges.get(&v) {
                        for edge in edges {
                            let w = &edge.to;
                            if *state.on_stack.get(w).unwrap_or(&false) {
                                let w_low = state.lowlink[w];
                                let v_low = state.lowlink[&v];
                                state.lowlink.insert(v.clone(), v_low.min(w_low));
                            }
                        }
                    }

                    if state.lowlink[&v] == state.index[&v] {
                        let mut component = Vec::new();
                        loop {
                            let w = state.stack.pop().expect("root must be on stack");
                            state.on_stack.insert(w.clone(), false);
                            let done = w == v;
                            component.push(w);
                            if done {
                                break;
                            }
                        }
                        state.sccs.push(component);
                    }
                }
            }
        }
    }

    let mut scc_of = HashMap::new();
    for (id, members) in state.sccs.iter().enumerate() {
        for m in members {
            scc_of.insert(m.clone(), id);
        }
    }

    (state.sccs, scc_of)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_node_name_is_hex_tagged() {
        assert_eq!(NodeKey::external_name(0x401030), "@external:0x401030");
    }
}
