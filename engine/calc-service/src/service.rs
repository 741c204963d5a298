//! Service state management and component initialization

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use calc_gateway::{CalcGateway, Evaluator, ProcessEvaluator};
use history_ledger::HistoryLedger;

/// Service state containing all initialized components
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    /// History ledger instance
    pub ledger: Arc<HistoryLedger>,

    /// CalcGateway instance
    pub gateway: CalcGateway,
}

/// A server started by [`ServiceState::start`]
pub struct RunningServer {
    /// Address the server is bound to
    pub addr: SocketAddr,

    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ServiceState {
    /// Create a new service state using the configured evaluator program
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let evaluator = Arc::new(ProcessEvaluator::from_config(&config.evaluator));
        info!(
            "Evaluator program: {} (timeout {} ms)",
            evaluator.program(),
            config.evaluator.timeout_ms
        );
        Self::with_evaluator(config, evaluator)
    }

    /// Create a new service state with a custom evaluator
    pub fn with_evaluator(config: ServiceConfig, evaluator: Arc<dyn Evaluator>) -> Result<Self> {
        info!("Initializing service components...");

        // Open the history ledger first; startup fails if history is unreadable
        info!("Opening history ledger in {:?}...", config.ledger.data_dir);
        let ledger = Arc::new(
            HistoryLedger::open_local(config.ledger.clone())
                .context("Failed to open history ledger")?,
        );
        info!("History ledger ready with {} records", ledger.len());

        // Initialize CalcGateway
        info!("Initializing CalcGateway...");
        let gateway = CalcGateway::new(config.gateway_config(), ledger.clone(), evaluator);

        Ok(Self { config, ledger, gateway })
    }

    /// Bind the server and start serving in the background
    pub fn start(&self) -> Result<RunningServer> {
        let addr = self.gateway.config().server_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();

        let (bound, server) = self
            .gateway
            .clone()
            .bind(addr, async move {
                let _ = stopped.await;
            })
            .context("Failed to start CalcGateway")?;

        info!("CalcGateway listening on {}", bound);
        let handle = tokio::spawn(server);

        Ok(RunningServer { addr: bound, stop, handle })
    }

    /// Serve until `shutdown` resolves, then shut down gracefully
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let server = self.start()?;

        info!("Calc service is running. Press Ctrl+C to shutdown gracefully.");
        shutdown.await;

        info!("Shutdown signal received. Initiating graceful shutdown...");
        self.stop(server).await
    }

    /// Stop a running server and flush the ledger
    pub async fn stop(&self, server: RunningServer) -> Result<()> {
        let _ = server.stop.send(());

        // Wait for open connections to drain with timeout
        let shutdown_timeout = self.config.service.shutdown_timeout();
        match timeout(shutdown_timeout, server.handle).await {
            Ok(Ok(())) => {
                info!("CalcGateway stopped gracefully");
            }
            Ok(Err(e)) => {
                error!("CalcGateway task failed: {}", e);
            }
            Err(_) => {
                warn!("CalcGateway did not stop within {:?}, forcing shutdown", shutdown_timeout);
            }
        }

        self.shutdown()
    }

    /// Flush durable state
    pub fn shutdown(&self) -> Result<()> {
        self.ledger.flush().context("Failed to flush history ledger")?;
        info!("History ledger flushed ({} records)", self.ledger.len());
        Ok(())
    }
}
