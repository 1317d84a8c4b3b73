use anyhow::Context;
use clap::Parser;
use intmaniac::runner::{RunArgsBuilder, RunResult, prepare_output_dir, root_log_path, run_tests};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Parser, Clone)]
#[command(version, about = "Runs docker-compose based integration test sets")]
struct Args {
    /// Specify the configuration file
    #[arg(short, long, default_value = "./intmaniac.yaml")]
    config_file: PathBuf,

    /// Add an environment setting to every test (KEY=VALUE, repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for test output and logs (default: ./intmaniac)
    #[arg(short = 't', long)]
    temp_output_dir: Option<PathBuf>,

    /// Quiet mode - no progress bar, only protocol and summary
    #[arg(short, long)]
    quiet: bool,

    /// Show the configured groups and tests without running anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let output_dir = prepare_output_dir(args.temp_output_dir.clone()).await?;
    init_tracing(args.verbose, &output_dir)?;

    let run_args = RunArgsBuilder::default()
        .config_file(args.config_file.clone())
        .env(args.env.clone())
        .output_dir(output_dir)
        .quiet(args.quiet)
        .dry_run(args.dry_run)
        .build()?;

    let result = run_tests(run_args).await?;

    if args.dry_run {
        println!("DRY RUN MODE - No tests will be executed");
        println!();
        result.write_plan(&mut std::io::stdout())?;
        println!();
        println!("To execute, run without --dry-run");
        return Ok(());
    }

    result.write_protocol(&mut std::io::stdout())?;
    print_summary(&result);

    if !result.succeeded {
        std::process::exit(1);
    }
    Ok(())
}

/// Log to stderr filtered by verbosity, and everything at debug level to the root log
fn init_tracing(verbose: u8, output_dir: &Path) -> anyhow::Result<()> {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("intmaniac={}", level)));

    let log_path = root_log_path(output_dir);
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

    let subscriber = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .with_filter(LevelFilter::DEBUG),
        );
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}

fn print_summary(result: &RunResult) {
    let Some(outcome) = &result.outcome else {
        return;
    };

    println!();
    println!("Summary");
    println!("=======");
    for report in &outcome.reports {
        println!("{}", report);
    }
    for name in &outcome.skipped {
        println!("{}: skipped", name);
    }
    println!(
        "Tests: {} run, {} failed",
        outcome.stats.tests_finished, outcome.stats.tests_failed
    );
    let (p50, p90, p99) = outcome.stats.get_percentiles();
    if let (Some(p50), Some(p90), Some(p99)) = (p50, p90, p99) {
        println!("Test time: p50: {}ms, p90: {}ms, p99: {}ms", p50, p90, p99);
    }
    println!("Duration: {:.2}s", outcome.duration.as_secs_f64());
    println!(
        "Result: {}",
        if result.succeeded { "SUCCESS" } else { "FAILED" }
    );
}
