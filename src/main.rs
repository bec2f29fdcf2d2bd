//! AML detector entry point
//!
//! `run` starts the live block listener and the alert API; `replay` feeds a
//! JSON file of transfers through the same pipeline and prints the results.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graph_aml::api::{self, AppState};
use graph_aml::blockchain::{
    load_contract_abi, BlockListener, EthersBlockSource, ListenerSettings,
};
use graph_aml::config::DetectorConfig;
use graph_aml::monitoring::PipelineMetrics;
use graph_aml::pipeline::{AlertFeed, Pipeline};
use graph_aml::risk::{LogisticNodeModel, RiskModel};
use graph_aml::RawTransfer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "aml_detector")]
#[command(about = "Streaming graph-based AML detector")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file (falls back to CONFIG_PATH, then config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen to the chain and serve alerts (default)
    Run,
    /// Process a JSON array of transfers and print the results
    Replay {
        /// Simulator-format transactions
        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging()?;

    info!("Starting AML detector v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = DetectorConfig::load(&config_path)
        .with_context(|| format!("invalid configuration {}", config_path.display()))?;

    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Replay { input } => replay(config, input),
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,h2=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_weights(path: &Path) -> Result<Arc<dyn RiskModel>> {
    let model = LogisticNodeModel::from_file(path).context("failed to load risk model")?;
    Ok(Arc::new(model))
}

async fn run(config: DetectorConfig) -> Result<()> {
    config.validate_live().context("live mode is not fully configured")?;
    let (Some(abi_path), Some(weights_path)) =
        (&config.blockchain.contract_abi_path, &config.model.weights_path)
    else {
        anyhow::bail!("live mode needs both a contract ABI and model weights");
    };
    load_contract_abi(abi_path).context("failed to load contract ABI")?;

    let model = load_weights(weights_path)?;
    let metrics = Arc::new(PipelineMetrics::new()?);
    let alerts = Arc::new(AlertFeed::new(config.alerts.capacity));
    let pipeline = Arc::new(
        Pipeline::new(model, alerts)
            .with_config(&config.pipeline)
            .with_metrics(metrics.clone()),
    );

    let source = EthersBlockSource::connect(
        &config.blockchain.node_url,
        Duration::from_secs(config.blockchain.request_timeout_secs),
    )
    .await
    .context("failed to connect to blockchain node")?;

    let shutdown = CancellationToken::new();
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    let listener = BlockListener::new(
        Arc::new(source),
        pipeline.clone(),
        ListenerSettings::from_config(&config.blockchain, &config.listener),
    )
    .with_metrics(metrics.clone());
    {
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            listener.run(shutdown).await;
            Ok(())
        });
    }

    if config.pipeline.drain_interval_ms > 0 {
        let pipeline = pipeline.clone();
        let shutdown = shutdown.clone();
        let interval = Duration::from_millis(config.pipeline.drain_interval_ms);
        tasks.spawn(async move {
            pipeline.run_consumer(interval, shutdown).await;
            Ok(())
        });
    }

    let state = AppState::new(pipeline.clone())
        .with_metrics(metrics)
        .with_read_window(config.alerts.read_window);
    {
        let shutdown = shutdown.clone();
        let bind = config.api.bind.clone();
        tasks.spawn(async move { api::serve(&bind, state, shutdown).await });
    }

    info!("✅ AML detector started in LIVE mode");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down...");
        }
        Some(joined) = tasks.join_next() => {
            match joined {
                Ok(Err(e)) => error!(error = %e, "Task failed, shutting down"),
                Err(e) => error!(error = %e, "Task panicked, shutting down"),
                Ok(Ok(())) => warn!("Task exited early, shutting down"),
            }
        }
    }

    shutdown.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Err(e)) = joined {
            error!(error = %e, "Task failed during shutdown");
        }
    }

    let stats = pipeline.stats();
    info!(
        clusters = stats.store.clusters,
        transfers = stats.store.transfers,
        flagged = stats.flagged_clusters,
        "AML detector stopped"
    );
    Ok(())
}

fn replay(config: DetectorConfig, input: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let transfers: Vec<RawTransfer> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of transfers", input.display()))?;

    let model: Arc<dyn RiskModel> = match &config.model.weights_path {
        Some(path) => load_weights(path)?,
        None => {
            warn!("No model weights configured, replaying with built-in weights");
            Arc::new(LogisticNodeModel::default())
        }
    };
    let alerts = Arc::new(AlertFeed::new(config.alerts.capacity.max(transfers.len())));
    let pipeline = Pipeline::new(model, alerts).with_config(&config.pipeline);

    info!(transfers = transfers.len(), input = %input.display(), "▶️ Replaying transfers");
    for transfer in transfers {
        pipeline.submit(transfer);
    }
    let results = pipeline.process_buffer();

    let stats = pipeline.stats();
    info!(
        results = results.len(),
        clusters = stats.store.clusters,
        flagged = stats.flagged_clusters,
        "Replay finished"
    );
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
