//! @ai:module:intent CLI for the prompt evaluation harness
//! @ai:module:layer presentation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prompt_bench::{
    config::EvalConfig,
    evaluator::Scorer,
    metrics::ResultAggregator,
    report::{format_rate, ReportGenerator, RunReport},
    runner::{Credentials, ProviderRouter, RunPlan, Runner, ScoredResult},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "prompt-bench")]
#[command(about = "Evaluate prompt variants across model providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every variant against every provider and case
    Run {
        /// Path to configuration file (TOML, JSON or YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory; a timestamped subdirectory is created per run
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Override the configured concurrency limit
        #[arg(long)]
        concurrency: Option<usize>,

        /// Replace every provider with an offline echo client
        #[arg(long)]
        dry_run: bool,
    },

    /// Load and validate a configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List cases, variants and providers
    List {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Regenerate reports from a saved results.json
    Report {
        /// Path to results.json
        #[arg(short, long)]
        results: PathBuf,

        /// Output directory (defaults to the results file's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a sample configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "prompt-bench.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prompt_bench=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output,
            concurrency,
            dry_run,
        } => {
            run_evaluation(RunArgs {
                config,
                output,
                concurrency,
                dry_run,
            })
            .await
        }
        Commands::Validate { config } => validate(&config),
        Commands::List { config } => list(&config),
        Commands::Report { results, output } => generate_reports(results, output),
        Commands::Init { output } => init_config(output),
    }
}

struct RunArgs {
    config: PathBuf,
    output: PathBuf,
    concurrency: Option<usize>,
    dry_run: bool,
}

/// @ai:intent Load config, run the matrix and write reports
/// @ai:post returns Ok when the run completes, even if cells failed
/// @ai:effects network, fs:read, fs:write
async fn run_evaluation(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let plan = Arc::new(config.build_plan()?);

    let mut settings = config.run_settings();
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }
        settings.concurrency_limit = concurrency;
    }

    let router = if args.dry_run {
        tracing::info!("Running in dry-run mode, providers replaced by echo clients");
        ProviderRouter::dry_run(&plan.providers)
    } else {
        let credentials = Credentials::from_env(&plan.providers);
        ProviderRouter::from_specs(&plan.providers, &credentials)?
    };
    let router = Arc::new(router);

    let scorer = Scorer::new(plan.default_scoring.clone()).with_judge(
        Arc::clone(&router),
        settings.retry_policy,
        settings.timeout,
    );

    let timestamp = chrono::Utc::now();
    let output_dir = args
        .output
        .join(timestamp.format("%Y-%m-%d_%H-%M-%S").to_string());
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    tracing::info!("Output directory: {}", output_dir.display());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run; in-flight cells will finish");
            signal_token.cancel();
        }
    });

    let runner = Runner::new(router, Arc::new(scorer));
    let mut handle = runner.run(Arc::clone(&plan), settings, cancel);

    let total = handle.total();
    let mut results = Vec::with_capacity(total);
    while let Some(result) = handle.next().await {
        tracing::info!(
            "[{}/{}] {} {} ({} attempt(s))",
            results.len() + 1,
            total,
            result.key,
            cell_label(&result),
            result.attempts
        );
        results.push(result);
    }
    let outcome = handle.finish().await;

    if outcome.cancelled {
        tracing::warn!(
            "Run cancelled: {} dispatched, {} never dispatched",
            outcome.dispatched,
            outcome.undispatched
        );
    }

    let report = RunReport::new(
        timestamp.to_rfc3339(),
        Some(args.config.display().to_string()),
        &outcome,
        &ResultAggregator::from_plan(&plan),
        results,
    );
    ReportGenerator::new().generate_all(&report, &output_dir)?;

    print_summary(&report);
    Ok(())
}

fn cell_label(result: &ScoredResult) -> String {
    match (&result.error, result.verdict.and_then(|v| v.passed())) {
        (Some(error), _) => format!("failed: {}", error.kind),
        (None, Some(true)) => "pass".to_string(),
        (None, Some(false)) => "fail".to_string(),
        (None, None) => "inconclusive".to_string(),
    }
}

/// @ai:intent Load a configuration, attaching the path to any error
/// @ai:effects fs:read
fn load_config(path: &Path) -> Result<EvalConfig> {
    EvalConfig::load(path).with_context(|| format!("Invalid configuration {}", path.display()))
}

/// @ai:intent Validate a configuration and print its matrix size
/// @ai:effects fs:read
fn validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let plan = config.build_plan()?;

    println!("Configuration is valid!");
    print_counts(&plan);
    Ok(())
}

fn print_counts(plan: &RunPlan) {
    println!("Cases:     {}", plan.cases.len());
    println!("Variants:  {}", plan.variants.len());
    println!(
        "Providers: {} ({} in matrix)",
        plan.providers.len(),
        plan.matrix_providers().len()
    );
    println!("Cells:     {}", plan.cell_count());
}

/// @ai:intent List cases, variants and providers
/// @ai:effects fs:read
fn list(path: &Path) -> Result<()> {
    let plan = load_config(path)?.build_plan()?;

    println!("Cases ({}):", plan.cases.len());
    println!("{:<30} {:<10} {:<30}", "ID", "Expected", "Tags");
    println!("{}", "-".repeat(70));
    for case in plan.cases.list() {
        println!(
            "{:<30} {:<10} {:<30}",
            case.id,
            if case.expected.is_some() { "yes" } else { "no" },
            case.tags.join(",")
        );
    }
    println!();

    println!("Variants ({}):", plan.variants.len());
    println!("{:<30} {:<12} {:<20}", "ID", "Origin", "Affinity");
    println!("{}", "-".repeat(62));
    for variant in plan.variants.list() {
        println!(
            "{:<30} {:<12} {:<20}",
            variant.id,
            variant.origin,
            variant.provider.as_deref().unwrap_or("-")
        );
    }
    println!();

    println!("Providers ({}):", plan.providers.len());
    println!("{:<20} {:<10} {:<30} {:<6}", "ID", "Kind", "Model", "Judge");
    println!("{}", "-".repeat(66));
    for provider in plan.providers.list() {
        println!(
            "{:<20} {:<10} {:<30} {:<6}",
            provider.id,
            provider.kind.as_str(),
            provider.model,
            if provider.judge_only { "only" } else { "-" }
        );
    }

    Ok(())
}

/// @ai:intent Re-aggregate a results file and regenerate reports
/// @ai:effects fs:read, fs:write
fn generate_reports(results_path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let mut report = RunReport::load(&results_path)?;
    report.reaggregate();

    let output_dir = output.unwrap_or_else(|| {
        results_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    ReportGenerator::new().generate_all(&report, &output_dir)?;

    println!("Reports generated in {}", output_dir.display());
    print_summary(&report);
    Ok(())
}

/// @ai:intent Initialize a sample configuration file
/// @ai:effects fs:write
fn init_config(output: PathBuf) -> Result<()> {
    EvalConfig::sample().save(&output)?;
    println!("Configuration saved to {}", output.display());
    Ok(())
}

/// @ai:intent Print summary to console
/// @ai:effects io
fn print_summary(report: &RunReport) {
    let summary = &report.summary;

    println!();
    println!("Prompt Evaluation Results");
    println!("=========================");
    println!();

    println!(
        "{:<24} {:<16} {:>6} {:>8} {:>7} {:>10}",
        "Variant", "Provider", "Cells", "Failed", "Incon.", "Pass rate"
    );
    println!("{}", "-".repeat(76));
    for group in &summary.groups {
        println!(
            "{:<24} {:<16} {:>6} {:>8} {:>7} {:>10}",
            group.variant,
            group.provider,
            group.stats.count,
            group.stats.failure_count,
            group.stats.inconclusive_count,
            format_rate(group.stats.pass_rate)
        );
    }
    println!();

    if !summary.origin_comparison.is_empty() {
        println!("{:<24} {:>10} {:>10} {:>10}", "Provider", "Baseline", "Optimized", "Delta");
        println!("{}", "-".repeat(57));
        for comparison in &summary.origin_comparison {
            println!(
                "{:<24} {:>10} {:>10} {:>10}",
                comparison.provider,
                format_rate(comparison.baseline_pass_rate),
                format_rate(comparison.optimized_pass_rate),
                comparison
                    .delta
                    .map(|d| format!("{:+.1}%", d * 100.0))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }
        println!();
    }

    if !summary.failures.is_empty() {
        println!("Failures ({}):", summary.failures.len());
        for failure in &summary.failures {
            println!("  {} [{}] {}", failure.key, failure.kind, failure.message);
        }
        println!();
    }

    if report.cancelled {
        println!("Run was cancelled; {} cell(s) not dispatched.", report.undispatched);
    }
}
