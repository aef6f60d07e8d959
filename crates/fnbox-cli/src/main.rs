//! fnbox CLI
//!
//! A command-line tool for running functions in warm or cold containers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fnbox::{
    CliEngine, Config, ContainerEngine, Dispatcher, EXAMPLE_CONFIG, ExecutionRequest,
    ExecutionResult, InMemoryRegistry, MetricsRecorder, MetricsStore, RuntimeMode,
    SqliteMetricsStore,
};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fnbox")]
#[command(about = "A tool for running untrusted functions in warm or cold containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: fnbox.toml)
        #[arg(short, long, default_value = "fnbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a source file once
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, javascript)
        #[arg(short, long)]
        language: String,

        /// Runtime mode: warm, cold-standard or cold-sandboxed
        #[arg(short, long, default_value = "cold-standard")]
        mode: RuntimeMode,

        /// Registered function to attribute metrics to
        #[arg(short, long)]
        function: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the warm container of every language that has one
    Warm,

    /// Show recorded metrics for a function
    Stats {
        /// Function name ("unknown" for unattributed runs)
        name: String,
    },

    /// Remove cold containers left behind by a crashed process
    Reap,

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            mode,
            function,
            json,
        } => run_source(config, &source, &language, mode, function, json).await,
        Commands::Warm => warm_up(config).await,
        Commands::Stats { name } => show_stats(&config, &name).await,
        Commands::Reap => reap(&config).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

fn engine(config: &Config) -> Arc<dyn ContainerEngine> {
    Arc::new(
        CliEngine::new(config.engine_binary())
            .with_exec_kill_inside(config.timeouts.exec_kill_inside),
    )
}

fn open_store(config: &Config) -> Result<Arc<dyn MetricsStore>> {
    let store = SqliteMetricsStore::open(&config.metrics_db).with_context(|| {
        format!(
            "failed to open metrics database '{}'",
            config.metrics_db.display()
        )
    })?;
    Ok(Arc::new(store))
}

async fn run_source(
    config: Config,
    source: &Path,
    language_id: &str,
    mode: RuntimeMode,
    function: Option<String>,
    json: bool,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let store = open_store(&config)?;
    let registry = Arc::new(InMemoryRegistry::from_config(&config));
    let engine = engine(&config);
    let dispatcher = Dispatcher::new(config, engine)
        .with_recorder(MetricsRecorder::new(store))
        .with_registry(registry);

    let mut request = ExecutionRequest::new(code, language_id, mode);
    request.function = function;

    info!(language = language_id, %mode, "running function");
    let result = dispatcher.execute(&request).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to serialize result")?
        );
    } else {
        print_result(&result);
    }

    if result.is_success() {
        Ok(())
    } else {
        std::process::exit(if result.exit_code > 0 {
            result.exit_code
        } else {
            1
        });
    }
}

fn print_result(result: &ExecutionResult) {
    if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprintln!("{}", result.stderr);
    }

    // Log execution info via tracing (stderr), keeping stdout clean for piping
    info!(
        exit_code = result.exit_code,
        duration = format_args!("{:.3}s", result.metrics.duration),
        cpu = format_args!("{:.1}%", result.metrics.cpu_percent),
        memory = format_args!("{:.1} MB", result.metrics.memory_mb),
        isolation = result.isolation.as_deref(),
        "execution result"
    );

    if let Some(ref error) = result.metrics.error {
        warn!(failure = ?result.failure, "{error}");
    }
}

async fn warm_up(config: Config) -> Result<()> {
    let engine = engine(&config);
    let dispatcher = Dispatcher::new(config, engine);
    let pool = dispatcher.pool();

    let running = pool.ensure_all().await;
    let entries = pool.snapshot().await;
    for entry in &entries {
        println!(
            "  {:<15} {:<25} {:<20} {}",
            entry.language, entry.container_name, entry.image, entry.state
        );
    }

    if running.len() < entries.len() {
        anyhow::bail!("some warm containers failed to start");
    }
    Ok(())
}

async fn show_stats(config: &Config, name: &str) -> Result<()> {
    let store = open_store(config)?;
    let aggregate = store
        .aggregate(name)
        .await
        .context("failed to query metrics")?;

    match aggregate.avg_duration {
        Some(avg) => println!(
            "{name}: {} invocation(s), average duration {avg:.3}s",
            aggregate.count
        ),
        None => println!("{name}: no invocations recorded"),
    }
    Ok(())
}

async fn reap(config: &Config) -> Result<()> {
    let removed = engine(config)
        .reap_orphans()
        .await
        .context("failed to remove orphaned containers")?;
    println!("Removed {removed} orphaned container(s)");
    Ok(())
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, lang) in languages {
        let modes = if lang.supports_warm() {
            "warm, cold"
        } else {
            "cold"
        };
        println!("  {:<15} {:<25} {} ({})", id, lang.name, lang.image, modes);
    }
}

fn show_config(config: &Config) {
    println!("Engine: {}", config.engine_binary().display());
    println!("Container workdir: {}", config.container_workdir);
    match config.workspace_root {
        Some(ref root) => println!("Workspace root: {}", root.display()),
        None => println!("Workspace root: system temp dir"),
    }
    println!("Metrics database: {}", config.metrics_db.display());
    println!();
    println!("Timeouts:");
    println!("  Warm: {}s", config.timeouts.warm);
    println!("  Cold: {}s", config.timeouts.cold);
    println!("  Grace: {}s", config.timeouts.grace);
    println!();
    println!("Runtimes:");
    println!("  Standard: {}", config.runtimes.standard);
    println!("  Sandboxed: {}", config.runtimes.sandboxed);
    println!("  Sandbox fallback: {}", config.runtimes.sandbox_fallback);
    println!();
    println!("Default container limits:");
    println!("  Memory: {:?} MB", config.default_limits.memory_mb);
    println!("  CPUs: {:?}", config.default_limits.cpus);
    println!("  Max processes: {:?}", config.default_limits.pids);
    println!("  Network: {:?}", config.default_limits.network);
    println!();
    println!("Languages configured: {}", config.languages.len());
    println!("Functions registered: {}", config.functions.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
