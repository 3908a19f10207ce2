//! Depth-bounded DFS path enumeration between named functions (§4.4).

use std::collections::HashSet;

use elfscope_common::{format_address, VAddr, UNRESOLVED};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::graph::{CallGraph, EdgeKind, NodeKey};

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CallSite {
    pub from_address: String,
    pub to_address: Option<String>,
    pub instruction: String,
    pub kind: String,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathStep {
    pub step: usize,
    pub from: String,
    pub to: String,
    pub calls: Vec<CallSite>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathRecord {
    pub path: Vec<String>,
    pub length: usize,
    pub steps: Vec<PathStep>,
}

#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathStatistics {
    pub total_paths: usize,
    pub max_depth: usize,
    pub min_depth: usize,
    pub average_depth: f64,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathSet {
    pub target_function: String,
    pub source_function: Option<String>,
    pub paths: Vec<PathRecord>,
    pub statistics: PathStatistics,
}

pub struct PathFinder<'g> {
    graph: &'g CallGraph,
    config: AnalysisConfig,
}

impl<'g> PathFinder<'g> {
    pub fn new(graph: &'g CallGraph, config: AnalysisConfig) -> Self {
        PathFinder { graph, config }
    }

    pub fn find_paths(&self, target: &str, source: Option<&str>) -> Result<PathSet, AnalysisError> {
        self.find_paths_with(
            target,
            source,
            self.config.max_path_depth,
            self.config.include_cycles,
            self.config.include_unresolved_paths,
        )
    }

    pub fn find_paths_with(
        &self,
        target: &str,
        source: Option<&str>,
        max_depth: usize,
        include_cycles: bool,
        include_unresolved: bool,
    ) -> Result<PathSet, AnalysisError> {
        let target_key = self
            .graph
            .resolve_name(target)
            .ok_or_else(|| AnalysisError::UnknownFunction(target.to_string()))?;
        let target_name = self.graph.node(&target_key).expect("resolved node exists").name.clone();

        let source_key = match source {
            Some(s) => Some(
                self.graph
                    .resolve_name(s)
                    .ok_or_else(|| AnalysisError::UnknownFunction(s.to_string()))?,
            ),
            None => None,
        };

        if let Some(ref src) = source_key {
            if *src == target_key {
                let only_path = self.build_record(&[target_key.clone()]);
                return Ok(self.finish(target_name, source.map(str::to_string), vec![only_path]));
            }
        }

        let starts: Vec<NodeKey> = match source_key {
            Some(src) => vec![src],
            None => self.graph.roots().cloned().collect(),
        };

        let mut node_paths: Vec<Vec<NodeKey>> = Vec::new();
        for start in starts {
            let mut path = vec![start.clone()];
            let mut visits = std::collections::HashMap::new();
            visits.insert(start.clone(), 1u32);
            let mut used_sites = HashSet::new();
            self.dfs(
                &start,
                &target_key,
                max_depth,
                include_cycles,
                include_unresolved,
                &mut path,
                &mut visits,
                &mut used_sites,
                &mut node_paths,
            );
        }

        let mut records: Vec<PathRecord> = node_paths.iter().map(|p| self.build_record(p)).collect();
        records.sort_by(|a, b| a.length.cmp(&b.length).then_with(|| a.path.cmp(&b.path)));
        records.dedup_by(|a, b| a.path == b.path);

        Ok(self.finish(target_name, source.map(str::to_string), records))
    }

    fn finish(&self, target_function: String, source_function: Option<String>, paths: Vec<PathRecord>) -> PathSet {
        let lengths: Vec<usize> = paths.iter().map(|p| p.length).collect();
        let statistics = if lengths.is_empty() {
            PathStatistics::default()
        } else {
            PathStatistics {
                total_paths: lengths.len(),
                max_depth: *lengths.iter().max().unwrap(),
                min_depth: *lengths.iter().min().unwrap(),
                average_depth: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
            }
        };

        PathSet {
            target_function,
            source_function,
            paths,
            statistics,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        current: &NodeKey,
        target: &NodeKey,
        depth_left: usize,
        include_cycles: bool,
        include_unresolved: bool,
        path: &mut Vec<NodeKey>,
        visits: &mut std::collections::HashMap<NodeKey, u32>,
        used_sites: &mut HashSet<VAddr>,
        out: &mut Vec<Vec<NodeKey>>,
    ) {
        if current == target {
            out.push(path.clone());
            return;
        }
        if depth_left == 0 {
            return;
        }

        let max_visits = if include_cycles { 2 } else { 1 };

        for edge in self.graph.callees(current) {
            if !include_unresolved && is_unresolved(&edge.to) {
                continue;
            }
            if used_sites.contains(&edge.site) {
                continue;
            }
            let visit_count = *visits.get(&edge.to).unwrap_or(&0);
            if visit_count >= max_visits {
                continue;
            }

            path.push(edge.to.clone());
            *visits.entry(edge.to.clone()).or_insert(0) += 1;
            used_sites.insert(edge.site);

            self.dfs(
                &edge.to,
                target,
                depth_left - 1,
                include_cycles,
                include_unresolved,
                path,
                visits,
                used_sites,
                out,
            );

            path.pop();
            *visits.get_mut(&edge.to).unwrap() -= 1;
            used_sites.remove(&edge.site);
        }
    }

    fn build_record(&self, nodes: &[NodeKey]) -> PathRecord {
        let names: Vec<String> = nodes
            .iter()
            .map(|k| self.graph.node(k).map(|n| n.name.clone()).unwrap_or_default())
            .collect();

        let mut steps = Vec::new();
        for (i, pair) in nodes.windows(2).enumerate() {
            let (from, to) = (&pair[0], &pair[1]);
            let calls: Vec<CallSite> = self
                .graph
                .callees(from)
                .iter()
                .filter(|e| &e.to == to)
                .map(|e| CallSite {
                    from_address: format_address(e.site),
                    to_address: e.callee_address.map(format_address),
                    instruction: edge_kind_mnemonic(e.kind),
                    kind: edge_kind_label(e.kind).to_string(),
                })
                .collect();

            steps.push(PathStep {
                step: i + 1,
                from: names[i].clone(),
                to: names[i + 1].clone(),
                calls,
            });
        }

        PathRecord {
            length: nodes.len().saturating_sub(1),
            path: names,
            steps,
        }
    }
}

fn is_unresolved(key: &NodeKey) -> bool {
    matches!(key, NodeKey::Function(f) if f == &elfscope_loader::FunctionKey::Name(UNRESOLVED.to_string()))
}

fn edge_kind_label(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Direct => "direct",
        EdgeKind::Indirect => "indirect",
        EdgeKind::Tail => "tail",
        EdgeKind::Plt => "plt",
    }
}

fn edge_kind_mnemonic(kind: EdgeKind) -> String {
    match kind {
        EdgeKind::Tail => "jmp".to_string(),
        _ => "call".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_kind_labels_match_the_documented_vocabulary() {
        assert_eq!(edge_kind_label(EdgeKind::Direct), "direct");
        assert_eq!(edge_kind_label(EdgeKind::Plt), "plt");
    }
}
