//! Main CalcGateway implementation

use crate::config::GatewayConfig;
use crate::error::{CalcError, GatewayError, GatewayResult};
use crate::evaluator::{Evaluator, ProcessEvaluator};
use crate::hub::BroadcastHub;
use crate::rest_api;
use crate::validator;

use calc_protocol::{CalculationRecord, CalculationRequest};
use history_ledger::HistoryLedger;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Calculation gateway: validation, evaluation, storage and fan-out
#[derive(Clone)]
pub struct CalcGateway {
    /// Gateway configuration
    config: Arc<GatewayConfig>,

    /// Durable history
    ledger: Arc<HistoryLedger>,

    /// Expression evaluator
    evaluator: Arc<dyn Evaluator>,

    /// Live subscriber registry
    hub: Arc<BroadcastHub>,
}

impl CalcGateway {
    /// Create a gateway over an opened ledger
    pub fn new(
        config: GatewayConfig,
        ledger: Arc<HistoryLedger>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        let hub = Arc::new(BroadcastHub::new(ledger.clone(), &config.hub));
        Self { config: Arc::new(config), ledger, evaluator, hub }
    }

    /// Create a gateway that evaluates with the configured evaluator program
    pub fn with_process_evaluator(config: GatewayConfig, ledger: Arc<HistoryLedger>) -> Self {
        let evaluator = Arc::new(ProcessEvaluator::from_config(&config.evaluator));
        Self::new(config, ledger, evaluator)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<HistoryLedger> {
        self.ledger.clone()
    }

    pub fn hub(&self) -> Arc<BroadcastHub> {
        self.hub.clone()
    }

    /// Validate and process a raw submission
    pub async fn submit_raw(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        float_requested: bool,
    ) -> Result<CalculationRecord, CalcError> {
        let request = validator::validate(body, content_type, float_requested)?;
        self.submit(request).await
    }

    /// Evaluate, append and publish a validated request
    ///
    /// Returns once the record is durable. Fan-out to subscribers runs on a
    /// detached task and never affects the result.
    pub async fn submit(&self, request: CalculationRequest) -> Result<CalculationRecord, CalcError> {
        let result = self.evaluator.evaluate(&request).await?;

        let ledger = self.ledger.clone();
        let record = tokio::task::spawn_blocking(move || ledger.append(&request, result))
            .await
            .map_err(|e| CalcError::Storage(format!("append task failed: {e}")))??;

        metrics::increment_counter!("calc_records_appended_total");

        // Detached: the caller never waits for fan-out
        let _ = self.publish(record.clone());

        Ok(record)
    }

    /// Fan out `record` to live subscribers on the blocking pool
    ///
    /// Publishing reads the ledger, which stays locked while an append syncs
    /// to disk.
    pub fn publish(&self, record: CalculationRecord) -> JoinHandle<usize> {
        let hub = self.hub.clone();
        tokio::task::spawn_blocking(move || hub.publish(&record))
    }

    /// Serve HTTP and WebSocket traffic until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.server_addr()?;
        let (bound, server) = self.bind(addr, shutdown)?;
        info!("CalcGateway listening on {}", bound);

        server.await;
        info!("CalcGateway stopped");
        Ok(())
    }

    /// Bind to `addr` and return the bound address with the server future
    ///
    /// Binding to port 0 picks a free port.
    pub fn bind<F>(
        self,
        addr: SocketAddr,
        shutdown: F,
    ) -> GatewayResult<(SocketAddr, impl Future<Output = ()> + Send + 'static)>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let routes = rest_api::create_routes(self);

        warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown).map_err(|e| {
            error!("Failed to bind {}: {}", addr, e);
            GatewayError::Bind(format!("{addr}: {e}"))
        })
    }
}
