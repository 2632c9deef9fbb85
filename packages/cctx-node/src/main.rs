use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use eyre::WrapErr;
use tokio::sync::watch;

use cctx_node::api::{self, ApiState};
use cctx_node::checkpoint::PgCheckpointStore;
use cctx_node::compliance::ComplianceFilter;
use cctx_node::config::{Config, TssConfig};
use cctx_node::consensus::HttpConsensusClient;
use cctx_node::db;
use cctx_node::observer::{ChainObserver, ObserverDeps};
use cctx_node::orchestrator::Orchestrator;
use cctx_node::rpc::evm::EvmRpcClient;
use cctx_node::tss::{HttpTssSigner, LocalTssSigner, TssSigner};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting CCTX node");

    let config = Config::load()?;
    tracing::info!(
        chains = ?config.enabled_chains().map(|c| c.chain_id).collect::<Vec<_>>(),
        consensus_chain_id = config.consensus.chain_id,
        operator = %config.consensus.operator_address,
        "Configuration loaded"
    );

    let db = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");

    db::run_migrations(&db).await?;
    tracing::info!("Database migrations complete");

    let tss: Arc<dyn TssSigner> = match &config.tss {
        TssConfig::Remote { url, evm_address } => {
            let address = Address::from_str(evm_address)
                .wrap_err("TSS_EVM_ADDRESS must be a valid address")?;
            Arc::new(HttpTssSigner::new(url, address)?)
        }
        TssConfig::Local { private_key } => {
            tracing::warn!("Using a local TSS key; devnets only");
            Arc::new(LocalTssSigner::from_private_key(private_key)?)
        }
    };
    tracing::info!(tss_address = %tss.evm_address(), "TSS signer ready");

    let consensus = Arc::new(HttpConsensusClient::new(
        &config.consensus.lcd_url,
        &config.consensus.broadcast_url,
        &config.consensus.operator_address,
    )?);

    let deps = ObserverDeps {
        consensus: consensus.clone(),
        checkpoints: Arc::new(PgCheckpointStore::new(db.clone())),
        compliance: Arc::new(ComplianceFilter::new(
            config.compliance.restricted_addresses.iter(),
        )),
        tss_address: tss.evm_address(),
        consensus_chain_id: config.consensus.chain_id,
        cache: config.cache.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut orchestrator = Orchestrator::new(consensus, shutdown_rx);
    for chain in config.enabled_chains() {
        let rpc = Arc::new(
            EvmRpcClient::new(chain.rpc_urls.clone())
                .wrap_err_with(|| format!("invalid RPC config for chain {}", chain.chain_id))?,
        );
        let rpc_endpoints = rpc.urls().len();
        let observer = ChainObserver::new(chain.clone(), rpc, deps.clone());
        orchestrator.add_chain(
            observer,
            Arc::clone(&tss),
            config.scheduler.clone(),
            config.tracker.clone(),
        )?;
        tracing::info!(
            chain_id = chain.chain_id,
            name = %chain.name,
            rpc_endpoints,
            "Chain registered"
        );
    }

    orchestrator.start().await?;
    tracing::info!("Chains prepared, starting processing");

    let api_state = ApiState::new(orchestrator.states());
    let api_addr = config.api.bind_addr;
    tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_addr, api_state).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    if let Err(e) = orchestrator.run().await {
        tracing::error!(error = %e, "Orchestrator error");
        return Err(e);
    }

    tracing::info!("CCTX node stopped");
    Ok(())
}

/// Initialize tracing/logging; `LOG_FORMAT=json` switches to JSON lines
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cctx_node=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
