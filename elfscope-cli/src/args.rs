use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(name = "elfscope", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print architecture, entry point and section summary.
    Info(InputArgs),

    /// Build the call graph and report functions, call relationships and
    /// summary statistics.
    Analyze(AnalyzeArgs),

    /// Enumerate call paths to (and optionally from) a function.
    Paths(PathsArgs),

    /// Report one function's callers, callees and recursion status.
    Function(NamedQueryArgs),

    /// Report call-graph-wide summary statistics.
    Summary(InputArgs),

    /// Report one function's worst-case cumulative stack consumption.
    Stack(NamedQueryArgs),

    /// Report stack consumption across every function, ranked by the
    /// heaviest paths.
    #[clap(alias = "stack-summary")]
    StackSummary(StackSummaryArgs),

    /// Emit a shell completion script.
    Complete(CompleteArgs),
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// Path to the ELF file to analyze.
    pub elf: PathBuf,

    /// Write the JSON report here instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Omit the `statistics` section from the report.
    #[arg(long)]
    pub no_statistics: bool,

    /// Add a `call_relationships_detail` section grouping every call site
    /// between each pair of functions.
    #[arg(long)]
    pub detail: bool,
}

#[derive(Args, Debug)]
pub struct NamedQueryArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// The function to query, by name.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct PathsArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// The target function every enumerated path must reach.
    pub target: String,

    /// Restrict enumeration to paths starting at this function.
    #[arg(long)]
    pub source: Option<String>,

    /// Maximum path length, in call edges.
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Allow a node to be revisited once per path.
    #[arg(long)]
    pub include_cycles: bool,

    /// Include paths that traverse the `@unresolved` sink.
    #[arg(long)]
    pub include_unresolved: bool,
}

#[derive(Args, Debug)]
pub struct StackSummaryArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// How many heaviest functions to list.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Shell to generate a completion script for.
    pub shell: Shell,
}
