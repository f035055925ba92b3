//! AutoPar Command Line Interface
//!
//! Usage:
//!   autopar [OPTIONS] <input-file>
//!   autopar --help
//!
//! Examples:
//!   autopar sum.json                      # Analyze with defaults
//!   autopar --ideal-threads=8 sum.json    # Wider pipeline budget
//!   autopar --emit=json sum.json          # Machine-readable report
//!   autopar --no-partition sum.json       # Classification only

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use std::fs;
use std::path::PathBuf;

use autopar::{analyze_function, AnalysisConfig, FunctionReport};

/// AutoPar - Loop dependence analysis for auto-parallelization
#[derive(Parser, Debug)]
#[command(name = "autopar")]
#[command(version)]
#[command(about = "Loop dependence analysis for auto-parallelization", long_about = None)]
struct Cli {
    /// Input file: a function description in JSON
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Ideal number of threads per loop partition
    #[arg(long, default_value = "4")]
    ideal_threads: usize,

    /// Skip the DSWP partition heuristics
    #[arg(long)]
    no_partition: bool,

    /// What to emit
    #[arg(long, default_value = "report")]
    emit: EmitKind,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Human-readable analysis report
    Report,
    /// The report as JSON
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("AutoPar v{}", autopar::VERSION);
    debug!("Input file: {:?}", cli.input);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;
    let func: autopar::ir::Function = serde_json::from_str(&source)
        .with_context(|| "Failed to parse the function description")?;

    let config = AnalysisConfig {
        ideal_threads: cli.ideal_threads,
        partition: !cli.no_partition,
    };
    info!("Analyzing...");
    let report = analyze_function(&func, config)
        .with_context(|| format!("Analysis failed for function '{}'", func.name))?;

    let output = match cli.emit {
        EmitKind::Json => serde_json::to_string_pretty(&report)?,
        EmitKind::Report => render_report(&report),
    };
    write_output(&cli.output, &output)
}

fn render_report(report: &FunctionReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("function {}\n", report.function));
    if report.loops.is_empty() {
        out.push_str("  no loops\n");
        return out;
    }
    for lr in &report.loops {
        out.push_str(&format!(
            "  loop at {} (depth {}): {} SCCs, pipeline={}, governed_by_iv={}\n",
            lr.header, lr.depth, lr.num_sccs, lr.is_pipeline, lr.governed_by_iv
        ));
        for scc in &lr.sccs {
            out.push_str(&format!(
                "    {} {} {}{}\n",
                scc.scc_type,
                scc.members.join(" "),
                scc.kind,
                if scc.clonable { " [clonable]" } else { "" }
            ));
        }
        for (task, members) in &lr.tasks {
            out.push_str(&format!("    {}: {}\n", task, members.join(" ")));
        }
    }
    out
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, content)
            .with_context(|| format!("Failed to write output file: {:?}", path)),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}
