pub mod artifact;
pub mod config;
pub mod launch;
pub mod supervisor;
pub mod telemetry;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use artifact::{ArtifactSpec, FetchPhase, fetch};
use config::Config;
use supervisor::{SessionKey, SessionRecord, StartRequest, Supervisor};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "rigsup",
    version,
    about = "Local supervisor for mining and node processes"
)]
pub struct Cli {
    /// Path to the config file (defaults to platform data dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Component {
    Miner,
    Node,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and cache a runnable binary without starting it
    Fetch {
        #[arg(value_enum, default_value = "miner")]
        component: Component,

        /// Network name (required for node artifacts)
        #[arg(long)]
        network: Option<String>,

        /// Override the artifact cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Emit the result as JSON (for embedding callers)
        #[arg(long)]
        json: bool,
    },
    /// Start a mining session and watch its telemetry
    Mine {
        /// Payout wallet address (falls back to config / RIGSUP_WALLET)
        #[arg(long)]
        wallet: Option<String>,

        /// Network being mined, names the session scope
        #[arg(long, default_value = "monero")]
        network: String,

        /// Environment tag for the session key
        #[arg(long, default_value = "mainnet")]
        env: String,

        /// Pool host override
        #[arg(long)]
        pool: Option<String>,

        /// Pool port override
        #[arg(long)]
        port: Option<u16>,

        /// Algorithm hint override
        #[arg(long)]
        algo: Option<String>,

        /// Override the artifact cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Start a node process and watch its sync status
    Node {
        /// Network whose node to run (must exist in config, or pass --repo)
        #[arg(long)]
        network: String,

        /// Environment tag for the session key
        #[arg(long, default_value = "mainnet")]
        env: String,

        /// GitHub owner/repo releasing the node binary
        #[arg(long)]
        repo: Option<String>,

        /// Binary name inside the release archive (defaults to the network name)
        #[arg(long)]
        binary: Option<String>,

        /// Override the artifact cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| Config::default_path(&default_data_dir()));
    let config = Config::load(Some(&config_path))?;

    match cli.command {
        Commands::Fetch {
            component,
            network,
            cache_dir,
            json,
        } => run_fetch(&config, component, network, cache_dir, json).await,
        Commands::Mine {
            wallet,
            network,
            env,
            pool,
            port,
            algo,
            cache_dir,
        } => run_mine(&config, wallet, network, env, pool, port, algo, cache_dir).await,
        Commands::Node {
            network,
            env,
            repo,
            binary,
            cache_dir,
        } => run_node(&config, network, env, repo, binary, cache_dir).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "rigsup", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

async fn run_fetch(
    config: &Config,
    component: Component,
    network: Option<String>,
    cache_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let spec = match component {
        Component::Miner => miner_spec()?,
        Component::Node => {
            let network = network.context("--network is required for node artifacts")?;
            node_spec(config, &network, None, None)?
        }
    };
    let cache_root = resolve_cache_root(config, cache_dir)?;
    let path = ensure_artifact(config, &spec, &cache_root).await?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "ready": true, "artifact": spec.name, "path": path })
        );
    } else {
        println!("{} {}", "ready:".green(), path.display());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_mine(
    config: &Config,
    wallet: Option<String>,
    network: String,
    env: String,
    pool: Option<String>,
    port: Option<u16>,
    algo: Option<String>,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    let wallet = wallet
        .or_else(|| config.wallet.clone())
        .context("no wallet configured; pass --wallet or set RIGSUP_WALLET")?;
    let pool_host = pool.unwrap_or_else(|| config.pool.host.clone());
    let pool_port = port.unwrap_or(config.pool.port);
    let algo = algo.or_else(|| config.pool.algo.clone());

    let cache_root = resolve_cache_root(config, cache_dir)?;
    let spec = miner_spec()?;
    let binary = ensure_artifact(config, &spec, &cache_root).await?;

    let key = SessionKey::miner(&network, &env);
    let mut args = launch::miner_args(&pool_host, pool_port, &wallet, algo.as_deref());
    args.extend(config.extra_miner_args.iter().cloned());

    let supervisor = Supervisor::new();
    supervisor.start(StartRequest {
        key: key.clone(),
        binary,
        args,
        cwd: None,
        identity: Some(wallet),
    })?;
    watch_session(&supervisor, &key).await
}

async fn run_node(
    config: &Config,
    network: String,
    env: String,
    repo: Option<String>,
    binary: Option<String>,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    let cache_root = resolve_cache_root(config, cache_dir)?;
    let spec = node_spec(config, &network, repo, binary)?;
    let node_binary = ensure_artifact(config, &spec, &cache_root).await?;

    let key = SessionKey::node(&network, &env);
    let workdir = artifact::session_workdir(&cache_root, &key)?;
    let args = launch::node_args(&network, &env, &workdir);

    let supervisor = Supervisor::new();
    supervisor.start(StartRequest {
        key: key.clone(),
        binary: node_binary,
        args,
        cwd: Some(workdir),
        identity: None,
    })?;
    watch_session(&supervisor, &key).await
}

fn miner_spec() -> Result<ArtifactSpec> {
    Ok(ArtifactSpec::miner(
        std::env::consts::OS,
        std::env::consts::ARCH,
    )?)
}

fn node_spec(
    config: &Config,
    network: &str,
    repo: Option<String>,
    binary: Option<String>,
) -> Result<ArtifactSpec> {
    let source = config.networks.get(network);
    let repo = repo
        .or_else(|| source.map(|s| s.repo.clone()))
        .with_context(|| format!("network `{network}` is not configured; pass --repo"))?;
    let binary = binary
        .or_else(|| source.map(|s| s.binary.clone()))
        .unwrap_or_else(|| network.to_string());
    Ok(ArtifactSpec::node(
        network,
        &repo,
        &binary,
        std::env::consts::OS,
        std::env::consts::ARCH,
    )?)
}

/// Resolve an artifact, preferring (in order) a system binary when allowed,
/// the cache, and finally a fresh download with a progress bar.
async fn ensure_artifact(
    config: &Config,
    spec: &ArtifactSpec,
    cache_root: &Path,
) -> Result<PathBuf> {
    if config.prefer_system_binary
        && let Some(path) = fetch::system_binary(spec)
    {
        info!(binary = %path.display(), "using system binary");
        return Ok(path);
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} {bytes}/{total_bytes}")
            .expect("static progress template"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut report = |phase: &FetchPhase| match phase {
        FetchPhase::Downloading { received, total } => {
            if let Some(total) = total {
                bar.set_length(*total);
            }
            bar.set_position(*received);
            bar.set_message("downloading");
        }
        other => bar.set_message(other.to_string()),
    };
    let path = fetch::ensure_ready(spec, cache_root, &mut report).await?;
    bar.finish_and_clear();
    Ok(path)
}

fn resolve_cache_root(config: &Config, flag: Option<PathBuf>) -> Result<PathBuf> {
    let root = flag
        .or_else(|| config.cache_dir.clone())
        .unwrap_or_else(default_cache_dir);
    std::fs::create_dir_all(&root)
        .with_context(|| format!("creating cache directory {}", root.display()))?;
    Ok(root)
}

/// Poll the session and render a status line until interrupted or the
/// process goes away.
async fn watch_session(supervisor: &Supervisor, key: &SessionKey) -> Result<()> {
    println!("{}", "press Ctrl-C to stop".dimmed());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!(key = %key, "interrupt received");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                match supervisor.status(key) {
                    Some(record) if record.is_running() => {
                        println!("{}", render_status(&record));
                    }
                    Some(record) => {
                        warn!(key = %key, state = %record.state, "session no longer running");
                        println!("{}", record.summary().as_str().yellow());
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    supervisor.shutdown();
    Ok(())
}

fn render_status(record: &SessionRecord) -> String {
    let metrics = &record.metrics;
    let uptime = (chrono::Utc::now() - record.spawned_at).num_seconds().max(0);
    let key = record.key.to_string();
    let rate = format_hashrate(metrics.hashrate);
    let mut line = format!(
        "{}  {}  up {}",
        key.as_str().cyan(),
        rate.as_str().bold(),
        format_uptime(uptime)
    );
    if metrics.accepted > 0 {
        line.push_str(&format!("  accepted {}", metrics.accepted));
    }
    if metrics.synced {
        line.push_str(&format!("  {}", "synced".green()));
    }
    line
}

fn format_hashrate(rate: f64) -> String {
    if rate >= 1e9 {
        format!("{:.2} GH/s", rate / 1e9)
    } else if rate >= 1e6 {
        format!("{:.2} MH/s", rate / 1e6)
    } else if rate >= 1e3 {
        format!("{:.2} kH/s", rate / 1e3)
    } else {
        format!("{rate:.1} H/s")
    }
}

fn format_uptime(secs: i64) -> String {
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Version plus build metadata for startup logging.
pub fn build_info() -> String {
    let built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown");
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    format!("{} ({target}, built {built})", env!("CARGO_PKG_VERSION"))
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("io", "rig-supervisor", "rigsup")
        .expect("project dirs available")
        .data_dir()
        .to_path_buf()
}

pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("io", "rig-supervisor", "rigsup")
        .expect("project dirs available")
        .cache_dir()
        .to_path_buf()
}
