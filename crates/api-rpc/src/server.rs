//! JSON-RPC Server
//!
//! Serves the provisioner methods over HTTP/WebSocket (jsonrpsee).

use crate::handler::RpcHandler;
use crate::types::{AcquireJobRequest, GetJobRequest, PostJobRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::{ErrorObjectOwned, Params};
use jsonrpsee::RpcModule;
use provisionerd_core::application::{Acquirer, JobPostingService};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9528;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
    /// Long-poll window for acquire_job when the client doesn't pick one
    pub acquire_long_poll: Duration,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            acquire_long_poll: provisionerd_core::application::acquirer::DEFAULT_ACQUIRE_JOB_LONG_POLL,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        acquirer: Acquirer,
        posting: Arc<JobPostingService>,
        shutdown: CancellationToken,
    ) -> Self {
        let handler = Arc::new(RpcHandler::new(
            acquirer,
            posting,
            config.acquire_long_poll,
            shutdown,
        ));
        Self { config, handler }
    }

    /// Start the JSON-RPC server; returns its handle and bound address
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let mut module = RpcModule::new(());

        // Register methods
        let handler = self.handler.clone();
        module
            .register_async_method("provisioner.acquire_job.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: AcquireJobRequest = parse_request(params)?;
                    handler.acquire_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("provisioner.post_job.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PostJobRequest = parse_request(params)?;
                    handler.post_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("provisioner.get_job.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetJobRequest = parse_request(params)?;
                    handler.get_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, "JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok((handle, local_addr))
    }
}

/// Requests arrive either as named params (`{..}`) or as a single
/// positional object (`[{..}]`), which is what `rpc_params!` sends.
fn parse_request<T: DeserializeOwned>(params: Params<'_>) -> Result<T, ErrorObjectOwned> {
    if params.is_object() {
        params.parse()
    } else {
        params.one()
    }
}
