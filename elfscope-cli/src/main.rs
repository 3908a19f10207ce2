mod args;
mod report;

use std::io::Write as _;
use std::path::Path;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use args::{Cli, Command};
use elfscope_analysis::{AnalysisConfig, AnalysisError, CallGraph, PathFinder, StackAnalyzer};
use elfscope_disasm::{DisasmError, Disassembler};
use elfscope_loader::{LoaderError, LoadedObject};

const EXIT_BAD_INPUT: u8 = 2;
const EXIT_UNSUPPORTED_ARCH: u8 = 3;
const EXIT_TARGET_NOT_FOUND: u8 = 4;
const EXIT_INTERNAL: u8 = 1;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("elfscope: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(loader_err) = err.downcast_ref::<LoaderError>() {
        return match loader_err {
            LoaderError::UnsupportedArch(_) => EXIT_UNSUPPORTED_ARCH,
            LoaderError::NotAnElf | LoaderError::TruncatedFile(_) | LoaderError::Io(_) => EXIT_BAD_INPUT,
        };
    }
    if let Some(disasm_err) = err.downcast_ref::<DisasmError>() {
        return match disasm_err {
            DisasmError::UnsupportedArch(_) => EXIT_UNSUPPORTED_ARCH,
            DisasmError::BackendInit(_) => EXIT_INTERNAL,
        };
    }
    if let Some(analysis_err) = err.downcast_ref::<AnalysisError>() {
        return match analysis_err {
            AnalysisError::UnknownFunction(_) => EXIT_TARGET_NOT_FOUND,
            AnalysisError::AnalysisAborted(_) => EXIT_INTERNAL,
        };
    }
    EXIT_INTERNAL
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Info(a) => emit(&a.output, report::info_report(&load(&a.elf)?, &path_string(&a.elf))),
        Command::Analyze(a) => {
            let object = load(&a.input.elf)?;
            let graph = build_graph(&object)?;
            let value =
                report::analyze_report(&object, &graph, &path_string(&a.input.elf), !a.no_statistics, a.detail);
            emit(&a.input.output, value)
        }
        Command::Summary(a) => {
            let object = load(&a.elf)?;
            let graph = build_graph(&object)?;
            let value = report::analyze_report(&object, &graph, &path_string(&a.elf), true, false);
            emit(&a.output, value)
        }
        Command::Function(a) => {
            let object = load(&a.input.elf)?;
            let graph = build_graph(&object)?;
            let key = graph
                .resolve_name(&a.name)
                .ok_or_else(|| AnalysisError::UnknownFunction(a.name.clone()))?;
            emit(&a.input.output, report::function_report(&object, &graph, &key))
        }
        Command::Paths(a) => {
            let object = load(&a.input.elf)?;
            let graph = build_graph(&object)?;
            let config = AnalysisConfig::for_arch(object.architecture);
            let max_depth = a.max_depth.unwrap_or(config.max_path_depth);
            let finder = PathFinder::new(&graph, config);
            let paths = finder.find_paths_with(
                &a.target,
                a.source.as_deref(),
                max_depth,
                a.include_cycles,
                a.include_unresolved,
            )?;
            emit(&a.input.output, report::path_report(&paths, max_depth))
        }
        Command::Stack(a) => {
            let object = load(&a.input.elf)?;
            let graph = build_graph(&object)?;
            let config = AnalysisConfig::for_arch(object.architecture);
            let analyzer = StackAnalyzer::new(&graph, config);
            let stack_report = analyzer.function_stack(&a.name)?;
            emit(&a.input.output, report::stack_report(&stack_report))
        }
        Command::StackSummary(a) => {
            let object = load(&a.input.elf)?;
            let graph = build_graph(&object)?;
            let config = AnalysisConfig::for_arch(object.architecture);
            let analyzer = StackAnalyzer::new(&graph, config);
            let summary = analyzer.summary(a.top);
            emit(&a.input.output, report::stack_summary_report(&summary, object.architecture))
        }
        Command::Complete(a) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(a.shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<LoadedObject, LoaderError> {
    LoadedObject::open(path)
}

fn build_graph(object: &LoadedObject) -> anyhow::Result<CallGraph> {
    let disasm = Disassembler::new(object.architecture, object.endianness)?;
    Ok(CallGraph::build(object, &disasm)?)
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

fn emit(output: &Option<std::path::PathBuf>, value: serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(&value)?;
    match output {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            file.write_all(text.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => println!("{text}"),
    }
    Ok(())
}
