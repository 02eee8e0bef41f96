mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use regscope_agent::{CancellationFlag, ClarificationHub, Orchestrator};
use regscope_ai::Oracle;
use regscope_ai::http::{DEFAULT_BASE_URL, DEFAULT_MODEL, HttpOracle};
use regscope_core::clarification::ClarificationRequest;
use regscope_core::config::RegscopeConfig;
use regscope_core::context::FeatureInput;
use regscope_core::verdict::ComplianceVerdict;
use regscope_search::{HttpToolProvider, ToolProvider, ToolRegistry};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PROMPT_POLL: Duration = Duration::from_millis(250);

/// Iterative compliance analysis for product features.
#[derive(Parser)]
#[command(name = "regscope", version, about = "Iterative compliance analysis for product features")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true, env = "REGSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the reasoning oracle (Messages API)
    #[arg(long, global = true, env = "REGSCOPE_ORACLE_URL")]
    oracle_url: Option<String>,

    /// Oracle model name
    #[arg(long, global = true, env = "REGSCOPE_ORACLE_MODEL", default_value = DEFAULT_MODEL)]
    oracle_model: String,

    /// Oracle API key
    #[arg(long, global = true, env = "REGSCOPE_ORACLE_API_KEY", hide_env_values = true)]
    oracle_api_key: Option<String>,

    /// Jurisdiction tool server URL (repeatable, or comma-separated in the env var)
    #[arg(long = "search-url", global = true, env = "REGSCOPE_SEARCH_URL", value_delimiter = ',')]
    search_urls: Vec<String>,

    /// Seconds to wait for a clarification answer before the default applies
    #[arg(long, global = true, env = "REGSCOPE_CLARIFY_TIMEOUT_SECS")]
    clarify_timeout_secs: Option<u64>,

    /// Print verdicts as JSON instead of a card
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one feature
    Analyze {
        /// Feature name
        #[arg(long)]
        name: String,
        /// Feature description
        #[arg(long, default_value = "")]
        description: String,
        /// Caller-supplied feature id
        #[arg(long)]
        id: Option<String>,
        /// Extra document (PRD, ticket) to read signals from
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,
        /// Leave clarifications unanswered so the timeout default applies
        #[arg(long)]
        non_interactive: bool,
    },

    /// Analyze a JSON array of features concurrently
    Batch {
        /// Path to the features JSON file
        file: PathBuf,
        /// Write the verdict array here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List discovered jurisdiction tools
    Tools,

    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
    let result = rt.block_on(run(cli, config));
    // A pending stdin read must not hold up exit.
    rt.shutdown_background();
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<RegscopeConfig> {
    let mut config = RegscopeConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;
    if let Some(secs) = cli.clarify_timeout_secs {
        let interval = config.clarification.poll_interval_ms.max(1);
        let polls = secs.saturating_mul(1000).div_ceil(interval).max(1);
        config.clarification.max_polls = u32::try_from(polls).unwrap_or(u32::MAX);
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

async fn run(cli: Cli, config: RegscopeConfig) -> anyhow::Result<()> {
    if let Commands::Config = cli.command {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let registry = discover_tools(&cli.search_urls, &config).await?;
    if let Commands::Tools = cli.command {
        display::print_tools(&registry.list_available_tools());
        return Ok(());
    }

    let mut orchestrator = Orchestrator::new(config.clone(), registry);
    match build_oracle(&cli, &config)? {
        Some(oracle) => {
            info!(oracle = oracle.name(), "reasoning oracle configured");
            orchestrator = orchestrator.with_oracle(oracle);
        }
        None => warn!("no oracle configured; deterministic fallbacks only"),
    }

    match cli.command {
        Commands::Analyze {
            name,
            description,
            id,
            docs,
            non_interactive,
        } => {
            let mut input = FeatureInput::new(name, description);
            if let Some(id) = id {
                input = input.with_id(id);
            }
            for path in &docs {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                input = input.with_document(text);
            }
            let verdict = if non_interactive {
                orchestrator.analyze(&input).await
            } else {
                analyze_interactive(&orchestrator, &input).await
            };
            emit(&verdict, cli.json)?;
        }
        Commands::Batch { file, out } => {
            let features = read_features(&file)?;
            let verdicts = orchestrator
                .analyze_batch(&features, &CancellationFlag::new())
                .await;
            let json = serde_json::to_string_pretty(&verdicts)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("Wrote {} verdicts to {}", verdicts.len(), path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Tools | Commands::Config => {}
    }
    Ok(())
}

async fn discover_tools(urls: &[String], config: &RegscopeConfig) -> anyhow::Result<ToolRegistry> {
    let timeout = Duration::from_secs(config.transport.search_timeout_secs);
    let mut providers: Vec<Arc<dyn ToolProvider>> = Vec::new();
    for url in urls.iter().filter(|u| !u.trim().is_empty()) {
        let provider = HttpToolProvider::new(url.trim())
            .with_timeout(timeout)
            .with_context(|| format!("building tool client for {url}"))?;
        providers.push(Arc::new(provider));
    }
    if providers.is_empty() {
        warn!("no tool servers configured; analysis will rely on holistic assessment");
    }
    Ok(ToolRegistry::discover(&providers).await.with_call_timeout(timeout))
}

fn build_oracle(cli: &Cli, config: &RegscopeConfig) -> anyhow::Result<Option<Arc<dyn Oracle>>> {
    if cli.oracle_url.is_none() && cli.oracle_api_key.is_none() {
        return Ok(None);
    }
    let base_url = cli.oracle_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let mut oracle = HttpOracle::new(base_url, &cli.oracle_model)
        .with_timeout(Duration::from_secs(config.transport.oracle_timeout_secs))
        .context("building oracle client")?;
    if let Some(key) = &cli.oracle_api_key {
        oracle = oracle.with_api_key(key);
    }
    Ok(Some(Arc::new(oracle)))
}

fn read_features(path: &Path) -> anyhow::Result<Vec<FeatureInput>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let features: Vec<FeatureInput> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    if features.is_empty() {
        bail!("{} contains no features", path.display());
    }
    Ok(features)
}

fn emit(verdict: &ComplianceVerdict, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(verdict)?);
    } else {
        display::print_verdict_card(verdict);
    }
    Ok(())
}

/// Run one analysis while answering its clarifications from stdin.
async fn analyze_interactive(orchestrator: &Orchestrator, input: &FeatureInput) -> ComplianceVerdict {
    let hub = orchestrator.hub().clone();
    let mut lines = spawn_stdin_reader();
    let mut current: Option<ClarificationRequest> = None;

    let analysis = orchestrator.analyze(input);
    tokio::pin!(analysis);

    loop {
        tokio::select! {
            verdict = &mut analysis => return verdict,
            Some(line) = lines.recv(), if current.is_some() => {
                if let Some(request) = current.take() {
                    submit_answer(&hub, &request, line.trim()).await;
                }
            }
            _ = tokio::time::sleep(PROMPT_POLL) => {
                current = refresh_prompt(&hub, current).await;
            }
        }
    }
}

/// Show a newly published prompt, or drop one that timed out.
async fn refresh_prompt(
    hub: &ClarificationHub,
    current: Option<ClarificationRequest>,
) -> Option<ClarificationRequest> {
    if let Some(request) = current {
        let still_pending = hub
            .poll_for_prompt(request.session_id)
            .await
            .is_some_and(|p| p.id == request.id);
        if still_pending {
            return Some(request);
        }
        eprintln!("(no answer in time; default applied)");
    }
    for session_id in hub.waiting_sessions().await {
        if let Some(request) = hub.poll_for_prompt(session_id).await {
            display::print_prompt(&request);
            return Some(request);
        }
    }
    None
}

async fn submit_answer(hub: &ClarificationHub, request: &ClarificationRequest, line: &str) {
    let answer = match line.parse::<usize>() {
        Ok(n) if (1..=request.options.len()).contains(&n) => request.options[n - 1].clone(),
        _ => line.to_string(),
    };
    if let Err(e) = hub.submit_response(request.session_id, request.id, &answer).await {
        eprintln!("Answer not accepted: {e}");
    }
}

/// Lines from stdin, read on a plain thread so a pending read never blocks
/// the runtime.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.clone()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}
