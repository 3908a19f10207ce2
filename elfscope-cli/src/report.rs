//! Assembles the JSON report shapes from the core library's data, adding
//! the `metadata`/`statistics` wrapper fields the CLI surface promises on
//! top of `elfscope-analysis`'s own report types.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use elfscope_analysis::{CallGraph, CallSite, EdgeKind, PathSet, StackReport, StackSummary};
use elfscope_common::{format_address, Arch};
use elfscope_loader::LoadedObject;
use serde::Serialize;
use serde_json::{json, Value};

fn export_time() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn edge_kind_label(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Direct => "direct",
        EdgeKind::Indirect => "indirect",
        EdgeKind::Tail => "tail",
        EdgeKind::Plt => "plt",
    }
}

fn edge_instruction(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Tail => "jmp",
        _ => "call",
    }
}

pub fn info_report(object: &LoadedObject, elf_file: &str) -> Value {
    json!({
        "metadata": {
            "tool_name": "elfscope",
            "version": env!("CARGO_PKG_VERSION"),
            "export_time": export_time(),
            "elf_file": elf_file,
            "architecture": object.architecture.to_string(),
        },
        "entry_point": format_address(object.entry_point),
        "bitness": format!("{:?}", object.bitness),
        "endianness": format!("{:?}", object.endianness),
        "sections": object.sections.iter().map(|s| json!({
            "name": s.name,
            "address": format_address(s.address),
            "size": s.size,
        })).collect::<Vec<_>>(),
        "functions": object.functions.len(),
    })
}

pub fn analyze_report(
    object: &LoadedObject,
    graph: &CallGraph,
    elf_file: &str,
    include_statistics: bool,
    include_detail: bool,
) -> Value {
    let mut functions = serde_json::Map::new();
    for info in graph.functions() {
        functions.insert(
            info.name.clone(),
            json!({
                "name": info.name,
                "address": match &info.key {
                    elfscope_analysis::NodeKey::Function(_) => object
                        .function_by_name(&info.name)
                        .map(|f| format_address(f.address))
                        .unwrap_or_default(),
                    elfscope_analysis::NodeKey::External(addr) => format_address(*addr),
                },
                "size": object.function_by_name(&info.name).map(|f| f.size).unwrap_or(0),
                "type": if info.is_internal { "internal" } else { "imported" },
                "external": !info.is_internal,
            }),
        );
    }

    let mut call_relationships = Vec::new();
    // Only populated when `include_detail` is set: every call site between
    // the same pair of functions, grouped under one relationship entry
    // instead of one flat row per edge.
    let mut detail_groups: BTreeMap<(String, String), Vec<CallSite>> = BTreeMap::new();
    let mut total_calls = 0usize;
    for info in graph.internal_functions() {
        for edge in graph.callees(&info.key) {
            total_calls += 1;
            let to_name = graph.node(&edge.to).map(|n| n.name.clone()).unwrap_or_default();
            call_relationships.push(json!({
                "from_function": info.name,
                "to_function": to_name,
                "from_address": format_address(edge.site),
                "to_address": edge.callee_address.map(format_address),
                "instruction": edge_instruction(edge.kind),
                "type": edge_kind_label(edge.kind),
            }));

            if include_detail {
                detail_groups.entry((info.name.clone(), to_name)).or_default().push(CallSite {
                    from_address: format_address(edge.site),
                    to_address: edge.callee_address.map(format_address),
                    instruction: edge_instruction(edge.kind).to_string(),
                    kind: edge_kind_label(edge.kind).to_string(),
                });
            }
        }
    }

    let mut report = json!({
        "metadata": {
            "tool_name": "elfscope",
            "version": env!("CARGO_PKG_VERSION"),
            "export_time": export_time(),
            "elf_file": elf_file,
            "architecture": object.architecture.to_string(),
        },
        "functions": functions,
        "call_relationships": call_relationships,
    });

    if include_detail {
        let call_relationships_detail: Vec<Value> = detail_groups
            .into_iter()
            .map(|((from, to), calls)| {
                json!({
                    "from_function": from,
                    "to_function": to,
                    "calls": calls,
                })
            })
            .collect();
        report["call_relationships_detail"] = json!(call_relationships_detail);
    }

    if include_statistics {
        let total_functions = graph.internal_functions().count();
        let external_functions = graph.functions().filter(|n| !n.is_internal).count();
        let recursive_functions = graph.internal_functions().filter(|n| graph.is_recursive(&n.key)).count();
        let average = if total_functions == 0 { 0.0 } else { total_calls as f64 / total_functions as f64 };

        report["statistics"] = json!({
            "total_functions": total_functions,
            "total_calls": total_calls,
            "external_functions": external_functions,
            "recursive_functions": recursive_functions,
            "average_calls_per_function": average,
        });
    }

    report
}

pub fn function_report(object: &LoadedObject, graph: &CallGraph, key: &elfscope_analysis::NodeKey) -> Value {
    let info = graph.node(key).expect("resolved key has a node");
    let callees: Vec<Value> = graph
        .callees(key)
        .iter()
        .map(|e| {
            json!({
                "to_function": graph.node(&e.to).map(|n| n.name.clone()).unwrap_or_default(),
                "from_address": format_address(e.site),
                "to_address": e.callee_address.map(format_address),
                "type": edge_kind_label(e.kind),
            })
        })
        .collect();
    let callers: Vec<&str> = graph.callers(key).filter_map(|k| graph.node(k)).map(|n| n.name.as_str()).collect();

    json!({
        "name": info.name,
        "is_internal": info.is_internal,
        "is_recursive": graph.is_recursive(key),
        "local_stack_frame": info.local_frame,
        "dynamic_alloca": info.dynamic_alloca,
        "callees": callees,
        "callers": callers,
        "size": object.function_by_name(&info.name).map(|f| f.size).unwrap_or(0),
    })
}

pub fn path_report(paths: &PathSet, max_depth: usize) -> Value {
    json!({
        "metadata": {
            "query": {
                "target_function": paths.target_function,
                "source_function": paths.source_function,
                "max_depth": max_depth,
            },
        },
        "path_analysis": to_value(paths),
    })
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).expect("report types always serialize")
}

pub fn stack_report(report: &StackReport) -> Value {
    to_value(report)
}

pub fn stack_summary_report(summary: &StackSummary, architecture: Arch) -> Value {
    json!({
        "summary": {
            "architecture": architecture.to_string(),
            "total_functions_analyzed": summary.total_functions_analyzed,
            "max_total_stack_consumption": summary.max_total_stack_consumption,
            "function_with_max_total_stack": summary.function_with_max_total_stack,
            "max_total_stack_call_path": summary.max_total_stack_call_path,
            "stack_distribution": summary.stack_distribution,
            "tail_call_policy": summary.tail_call_policy,
        },
        "heavy_functions": summary.heavy_functions,
    })
}
