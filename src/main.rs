use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use load_probe_rs::config::Config;
use load_probe_rs::context::RunContext;
use load_probe_rs::types::{RunSummary, Target, ToolKind};
use load_probe_rs::{doctor, http, prober, registry, runner, server, tools};

/// load-probe-rs: availability, load and attack-under-load probing of HTTP
/// targets with static HTML reports.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "load-probe-rs",
    version,
    about = "Availability, load and attack-under-load probing of HTTP targets \
         with static HTML reports.",
    long_about = None
)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for run results (overrides the config file).
    #[arg(long = "results-dir", global = true)]
    results_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Probe every registered target and print its availability.
    Discover {
        /// Write the probed targets as pretty JSON to this path.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Load probe and external tools against online targets, then write the HTML report.
    Run {
        /// Maximum number of online targets to exercise.
        #[arg(long = "max-targets")]
        max_targets: Option<usize>,

        /// Requests per load probe.
        #[arg(long)]
        requests: Option<usize>,

        /// Concurrent workers per load probe.
        #[arg(long)]
        concurrency: Option<usize>,

        /// External tools to run (repeatable). Defaults to the configured list.
        #[arg(long = "tool", value_enum)]
        tools: Vec<ToolKind>,
    },
    /// Compare attack success with and without concurrent load. Authorized targets only.
    Hybrid {
        /// Flood duration in seconds.
        #[arg(long)]
        duration: Option<u64>,

        /// Directory with sqli_payloads.txt, sqli_errors.txt and xss_payloads.txt.
        #[arg(long = "toolkit-dir")]
        toolkit_dir: Option<PathBuf>,
    },
    /// Run a single external tool against an arbitrary URL.
    Tool {
        #[arg(value_enum)]
        tool: ToolKind,

        /// Base URL of the service.
        #[arg(long)]
        url: String,

        #[arg(long, default_value = "/")]
        endpoint: String,

        /// Name used for generated file names.
        #[arg(long, default_value = "adhoc")]
        name: String,

        /// Locust simulated users (overrides the config file).
        #[arg(long)]
        users: Option<u32>,

        /// Locust users spawned per second (overrides the config file).
        #[arg(long = "spawn-rate")]
        spawn_rate: Option<u32>,

        /// Locust run time, e.g. 30s or 2m (overrides the config file).
        #[arg(long = "run-time")]
        run_time: Option<String>,
    },
    /// Check that Docker, the tool images and Locust are available.
    Doctor,
    /// Serve the results directory over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = &cli.results_dir {
        config.results_dir = dir.clone();
    }

    match cli.command.clone() {
        Command::Discover { json } => discover(&config, json.as_deref()).await,
        Command::Run {
            max_targets,
            requests,
            concurrency,
            tools,
        } => {
            if let Some(n) = max_targets {
                config.max_targets = n;
            }
            if let Some(n) = requests {
                config.load.total_requests = n;
            }
            if let Some(n) = concurrency {
                config.load.concurrency = n;
            }
            if !tools.is_empty() {
                config.tools.enabled = tools;
            }
            config.validate()?;
            run(&cli, &config).await
        }
        Command::Hybrid {
            duration,
            toolkit_dir,
        } => {
            if let Some(secs) = duration {
                config.flood.duration_secs = secs;
            }
            if toolkit_dir.is_some() {
                config.hybrid.toolkit_dir = toolkit_dir;
            }
            config.validate()?;
            hybrid(&config).await
        }
        Command::Tool {
            tool,
            url,
            endpoint,
            name,
            users,
            spawn_rate,
            run_time,
        } => {
            config.tools.override_locust(users, spawn_rate, run_time);
            config.validate()?;
            single_tool(&config, tool, &url, &endpoint, &name).await
        }
        Command::Doctor => run_doctor(&config).await,
        Command::Serve { bind } => {
            println!("Serving {} on http://{}", config.results_dir.display(), bind);
            server::spawn_server(&bind, config.results_dir.clone()).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "load_probe_rs=debug"
    } else {
        "load_probe_rs=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Cancel the returned token on Ctrl+C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let t = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current step");
            t.cancel();
        }
    });
    token
}

fn print_config(cli: &Cli, config: &Config) {
    println!("load-probe-rs configuration:");
    println!(
        "  config       : {}",
        cli.config
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<built-in defaults>".to_string())
    );
    println!("  results_dir  : {}", config.results_dir.display());
    println!("  max_targets  : {}", config.max_targets);
    println!("  requests     : {}", config.load.total_requests);
    println!("  concurrency  : {}", config.load.concurrency);
    println!(
        "  tools        : {}",
        config
            .tools
            .enabled
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
}

async fn discover(config: &Config, json: Option<&Path>) -> Result<()> {
    let client = http::build_client()?;
    let mut targets = registry::load_targets(&config.targets)?;
    prober::probe_all(&client, &mut targets, &config.probe).await;
    print_targets_table(&targets);
    if let Some(path) = json {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &targets)?;
        println!("Wrote JSON targets to {}", path.display());
    }
    Ok(())
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    print_config(cli, config);
    let client = http::build_client()?;
    let mut ctx = RunContext::create(&config.results_dir, "run")?;
    let cancel = ctrl_c_token();

    let report = runner::run_performance(&client, config, &mut ctx, &cancel).await?;
    print_targets_table(&report.targets);
    print_summary(&report.summary);
    println!(
        "\nReport: {}",
        ctx.path(runner::PERFORMANCE_REPORT_FILE).display()
    );
    Ok(())
}

async fn hybrid(config: &Config) -> Result<()> {
    println!(
        "WARNING: hybrid mode sends SQL injection and XSS payloads while flooding the target."
    );
    println!("Only run it against services you own or are explicitly authorized to test.\n");

    let client = http::build_client()?;
    let mut ctx = RunContext::create(&config.results_dir, "run")?;
    let cancel = ctrl_c_token();

    let report = runner::run_hybrid(&client, config, &mut ctx, &cancel).await?;
    for r in &report.records {
        let c = &r.comparison;
        println!(
            "{}{}: baseline {}, under load {}/{} ({:.1}%), stressed: {}, \
             load made attacks easier: {}",
            r.target_url,
            r.endpoint,
            if c.baseline_success { "vulnerable" } else { "no finding" },
            c.successful_attacks_under_load,
            c.total_attacks_under_load,
            c.under_load_success_rate,
            c.system_stressed,
            c.load_made_attacks_easier,
        );
    }
    print_summary(&ctx.summary());
    println!("\nReport: {}", ctx.path(runner::HYBRID_REPORT_FILE).display());
    Ok(())
}

async fn single_tool(
    config: &Config,
    tool: ToolKind,
    url: &str,
    endpoint: &str,
    name: &str,
) -> Result<()> {
    registry::validate_url(name, url)?;
    let ctx = RunContext::create(&config.results_dir, "run")?;
    let invoker = tools::ToolInvoker::new(config.tools.clone(), ctx.run_dir());
    let run = invoker.invoke(tool, name, url, endpoint).await;

    println!("{tool}: {}", run.status);
    if let Some(p) = &run.script_path {
        println!("  script : {}", p.display());
    }
    if let Some(p) = &run.report_path {
        println!("  report : {}", p.display());
    }
    if let Some(reason) = &run.reason {
        println!("  reason : {reason}");
    }
    if let Some(err) = &run.error {
        println!("  error  : {}", err.lines().next().unwrap_or(""));
    }
    Ok(())
}

async fn run_doctor(config: &Config) -> Result<()> {
    let checks = doctor::run_checks(&config.tools, &config.results_dir).await;
    let name_w = checks.iter().map(|c| c.name.len()).max().unwrap_or(4).max(5);
    println!("{:<name_w$}  {:<4}  detail", "check", "ok", name_w = name_w);
    println!("{:-<name_w$}  {:-<4}  {:-<6}", "", "", "", name_w = name_w);
    for c in &checks {
        println!(
            "{:<name_w$}  {:<4}  {}",
            c.name,
            if c.ok { "yes" } else { "no" },
            c.detail,
            name_w = name_w
        );
    }
    let failed = checks.iter().filter(|c| !c.ok).count();
    if failed > 0 {
        println!("\n{failed} check(s) failed; affected tools will be skipped during runs.");
    } else {
        println!("\nAll checks passed.");
    }
    Ok(())
}

fn print_targets_table(targets: &[Target]) {
    let mut name_w = "name".len();
    let mut url_w = "url".len();
    for t in targets {
        name_w = name_w.max(t.name.len());
        url_w = url_w.max(t.url.len());
    }
    let proj_w = "pentesting".len();
    let status_w = "offline".len();
    let lat_w = "latency_ms".len();

    let online = targets.iter().filter(|t| t.is_online()).count();
    println!("\nTargets online: {} (of {})", online, targets.len());
    println!(
        "{:<name_w$}  {:<proj_w$}  {:<url_w$}  {:<status_w$}  {:>lat_w$}",
        "name",
        "project",
        "url",
        "status",
        "latency_ms",
        name_w = name_w,
        proj_w = proj_w,
        url_w = url_w,
        status_w = status_w,
        lat_w = lat_w
    );
    println!(
        "{:-<name_w$}  {:-<proj_w$}  {:-<url_w$}  {:-<status_w$}  {:-<lat_w$}",
        "",
        "",
        "",
        "",
        "",
        name_w = name_w,
        proj_w = proj_w,
        url_w = url_w,
        status_w = status_w,
        lat_w = lat_w
    );
    for t in targets {
        let latency = t
            .latency_ms
            .map(|l| format!("{l:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<name_w$}  {:<proj_w$}  {:<url_w$}  {:<status_w$}  {:>lat_w$}",
            t.name,
            t.project,
            t.url,
            t.status.to_string(),
            latency,
            name_w = name_w,
            proj_w = proj_w,
            url_w = url_w,
            status_w = status_w,
            lat_w = lat_w
        );
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "\nSteps: {} total, {} passed, {} warning, {} failed, {} skipped",
        summary.total(),
        summary.passed,
        summary.warning,
        summary.failed,
        summary.skipped
    );
}
