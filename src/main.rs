//! rsynctransfer CLI - push weather station reports with rsync
//!
//! Runs the report sync once, feeds files through the background worker,
//! or prints the rsync command a transfer would use.

use anyhow::Context;
use clap::Parser;
use rsync_transfer::command::CommandBuilder;
use rsync_transfer::config::{CliArgs, Commands, ConfigFile, OutputFormat, ReportConfig, TransferConfig};
use rsync_transfer::logging::TracingLog;
use rsync_transfer::process::SystemRunner;
use rsync_transfer::report::ReportSync;
use rsync_transfer::worker::RsyncService;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v/-q
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let config = ConfigFile::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    match &args.command {
        Commands::Report {
            local_root,
            dry_run,
            output_format,
        } => cmd_report(&config, local_root.as_deref(), *dry_run, *output_format, args.quiet),
        Commands::Queue {
            stop_timeout,
            paths,
        } => cmd_queue(&config, paths, *stop_timeout, args.quiet),
        Commands::Command { file } => cmd_command(&config, file.as_deref()),
    }
}

fn report_config(config: &ConfigFile, local_root: Option<&str>) -> anyhow::Result<ReportConfig> {
    let Some(root) = local_root else {
        return Ok(config.report_config()?);
    };

    let transfer = config
        .report
        .clone()
        .context("missing [Rsynctransfer] section")?;
    Ok(ReportConfig::from_transfer(TransferConfig {
        local_root: Some(root.to_string()),
        ..transfer
    })?)
}

fn cmd_report(
    config: &ConfigFile,
    local_root: Option<&str>,
    dry_run: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let sync = ReportSync::new(
        report_config(config, local_root)?,
        Arc::new(SystemRunner),
        Arc::new(TracingLog),
    );

    if dry_run {
        println!("=== Dry Run Mode ===");
        print_command(&sync.command());
        return Ok(());
    }

    let Some(outcome) = sync.run()? else {
        if !quiet {
            println!("Report sync is disabled");
        }
        return Ok(());
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text if !quiet => println!("{}", outcome),
        OutputFormat::Text => {}
    }

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_queue(
    config: &ConfigFile,
    paths: &[PathBuf],
    stop_timeout: Duration,
    quiet: bool,
) -> anyhow::Result<()> {
    let service = RsyncService::start(config.worker_config()?, Arc::new(SystemRunner), Arc::new(TracingLog))?;

    if paths.is_empty() {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = line.context("reading paths from stdin")?;
            let line = line.trim();
            if !line.is_empty() {
                service.enqueue(line)?;
            }
        }
    } else {
        for path in paths {
            service.enqueue(path)?;
        }
    }

    let summary = service.stop(stop_timeout)?;

    if !quiet {
        println!("=== Transfer Summary ===");
        println!("Dispatched:        {}", summary.dispatched);
        println!("Missing:           {}", summary.missing);
        println!("Dropped (backlog): {}", summary.trimmed);
        if summary.skipped_disabled > 0 {
            println!("Skipped (disabled): {}", summary.skipped_disabled);
        }
    }
    Ok(())
}

fn cmd_command(config: &ConfigFile, file: Option<&std::path::Path>) -> anyhow::Result<()> {
    match file {
        Some(file) => {
            let transfer = config.worker_config()?;
            print_command(&CommandBuilder::for_today(&transfer).file_command(file));
        }
        None => {
            let report = config.report_config()?;
            print_command(&CommandBuilder::for_today(&report.transfer).report_command(&report.local_root));
        }
    }
    Ok(())
}

fn print_command(built: &rsync_transfer::command::BuiltCommand) {
    for warning in &built.warnings {
        eprintln!("warning: {}", warning);
    }
    println!("{}", built.command);
    println!("# on missing destination: {}", built.mkdir);
}
