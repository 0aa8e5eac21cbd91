use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

use bxfill::config::{FillConfig, ReferenceSource, RunConfig, ToolCommands};
use bxfill::dispatch;
use bxfill::pipeline::RunDirs;
use bxfill::tools::ProcessTools;

mod cli;

/// Install the stderr logger. `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_filter(filter_layer);

    Registry::default().with(stderr_log).init();
}

fn run_config(args: &cli::FillArgs) -> Result<RunConfig> {
    let reference = match (&args.ref_dir, &args.contigs) {
        (Some(dir), None) => ReferenceSource::Directory(dir.clone()),
        (None, Some(contigs)) => ReferenceSource::Contigs(contigs.clone()),
        _ => return Err(anyhow!("exactly one of --ref-dir and --contigs is required")),
    };

    let tools = match &args.tools {
        Some(path) => ToolCommands::from_json(path)
            .with_context(|| format!("Could not read the tool names from {}", path.display()))?,
        None => ToolCommands::default(),
    };

    let threads = args.threads
        .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

    Ok(RunConfig {
        graph: args.graph.clone(),
        bam: args.bam.clone(),
        reads: args.reads.clone(),
        index: args.index.clone(),
        reference,
        out_dir: args.out.clone(),
        threads,
        start_line: args.line,
        keep_going: args.keep_going,
        fill: FillConfig {
            chunk: args.chunk,
            min_barcode_freq: args.min_barcode_freq,
            kmer_sizes: args.kmer_sizes.clone(),
            abundance_thresholds: args.abundance_thresholds.clone(),
            extension: args.extension,
            force: args.force,
            max_nodes: args.max_nodes,
            max_length: args.max_length,
            nb_cores: args.nb_cores,
            max_memory: args.max_memory,
            verbosity: args.mtg_verbose,
            tool_timeout_secs: args.tool_timeout,
        },
        tools,
    })
}

fn fill_subcommand(args: &cli::FillArgs) -> Result<()> {
    let config = run_config(args)?;
    config.validate()
        .with_context(|| "Invalid arguments.")?;

    let dirs = RunDirs::new(&config.out_dir);
    let tools = ProcessTools::new(config.tools.clone(), &dirs.logs, config.fill.tool_timeout());

    let summary = dispatch::run(&config, &tools)
        .with_context(|| format!("Could not fill the gaps of {}.", config.graph.display()))?;

    info!(
        gaps = summary.gaps,
        filled = summary.filled,
        retained = summary.retained,
        failed = summary.failed,
        "done"
    );

    Ok(())
}

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();
    init_logging(args.verbose);

    let result = match &args.command {
        Some(cli::CliSubcommand::Fill(v)) => fill_subcommand(v),
        None => Err(anyhow!("No subcommand given.")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        },
    }
}
