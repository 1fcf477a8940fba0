//! Command-line entry point.
//!
//! Parses one transcoding request, expands it into jobs, and runs the
//! resulting queue.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use riprun::config::Settings;
use riprun::{expand, JobQueue, Orchestrator, ParameterSet, Preset, Reporter, Request};

/// Queue and run media transcoding command chains
#[derive(Parser, Debug)]
#[command(name = "riprun")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file; repeatable, `::` separates multiple inputs in one flag
    #[arg(short, long = "input")]
    input: Vec<String>,

    /// Output name pattern, `?{...}` iterator tokens included
    #[arg(short, long)]
    output: Option<String>,

    /// Output directory (defaults to the working directory)
    #[arg(long = "dir")]
    output_dir: Option<PathBuf>,

    /// Encoding preset
    #[arg(short, long)]
    preset: Option<String>,

    /// Additional KEY=VALUE option; repeatable
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Subtitle selection: a path, a `::`-separated list, or auto[:filter]
    #[arg(long)]
    sub: Option<String>,

    /// Raw colon-separated key=value encoder parameter block
    #[arg(long, value_name = "BLOCK")]
    raw: Option<String>,

    /// Run jobs in parallel, one worker per job
    #[arg(long)]
    parallel: bool,

    /// Schedule a system shutdown after the run, optionally delayed
    #[arg(long, num_args = 0..=1, value_name = "SECONDS")]
    shutdown: Option<Option<u64>>,

    /// Path to the configuration file
    #[arg(short, long, default_value = "riprun.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut settings = if args.config.exists() {
        match Settings::load(&args.config) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("failed to load {}: {}", args.config.display(), e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        let mut settings = Settings::default();
        settings.apply_env_overrides();
        settings
    };
    if args.parallel {
        settings.run.parallel = true;
    }

    let mut options = ParameterSet::new();
    for pair in &args.set {
        match pair.split_once('=') {
            Some((key, value)) => options.set(key, value),
            None => {
                eprintln!("invalid option \"{}\", expected KEY=VALUE", pair);
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(sub) = &args.sub {
        options.set("sub", sub);
    }

    let preset = match args.preset.as_deref() {
        Some(name) => Preset::parse_lenient(name),
        None => {
            tracing::warn!("no preset given, defaulting to custom");
            Preset::Custom
        }
    };

    if let Some(block) = &args.raw {
        match preset {
            Preset::X264(_) => options.set("x264-params", block),
            Preset::X265(_) => options.set("x265-params", block),
            _ => tracing::warn!("--raw only applies to the x264/x265 presets, ignoring it"),
        }
    }

    let inputs: Vec<String> = args
        .input
        .iter()
        .flat_map(|entry| entry.split("::"))
        .map(str::to_string)
        .collect();

    let request = Request {
        inputs,
        output_base: args.output.clone(),
        output_dir: args.output_dir.clone(),
        preset,
        options,
    };

    let reporter = Arc::new(Reporter::new());
    let jobs = match expand(&request, &settings, &reporter) {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if jobs.is_empty() {
        tracing::warn!("nothing to run");
        return ExitCode::SUCCESS;
    }

    let mut queue = JobQueue::new();
    queue.extend(jobs);
    tracing::info!("{}", queue.describe());

    let shutdown_after = args
        .shutdown
        .map(|delay| delay.unwrap_or(settings.run.shutdown_delay_secs));

    let orchestrator = Orchestrator::new(settings, Arc::clone(&reporter));
    match orchestrator.run(&mut queue, shutdown_after).await {
        Ok(outcome) => {
            tracing::info!(
                "run finished: {} / {} jobs completed",
                outcome.completed,
                outcome.total
            );
            if outcome.completed == outcome.total && outcome.tally.errors == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
