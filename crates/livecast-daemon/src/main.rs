mod acquire;
mod board;
mod client;
mod coordinator;
mod http;
mod inflight;
mod logging;
mod poller;
mod services;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use livecast_proto::config::Config;
use livecast_proto::model::PollScope;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::acquire::Acquirer;
use crate::board::StatusBoard;
use crate::client::{AcquisitionClient, BackendClient};
use crate::coordinator::Coordinator;
use crate::logging::RecentLogs;
use crate::poller::{PollerHandle, PollingEngine};
use crate::services::Services;

/// Warnings and errors kept for `/api/logs`.
const RECENT_LOG_LINES: usize = 200;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    let recent_logs = RecentLogs::new(RECENT_LOG_LINES);
    logging::init(&config.daemon.log_file, recent_logs.clone())?;

    info!("Log file: {:?}", config.daemon.log_file);
    info!("Config loaded from: {:?}", Config::config_path());

    let backend = Arc::new(BackendClient::new(&config.backend)?);
    let acquisition = Arc::new(AcquisitionClient::new(
        &config.acquisition,
        config.backend.request_timeout(),
    )?);
    info!(
        "Backend at {}, downloads via {}",
        config.backend.base_url, config.acquisition.base_url
    );

    let scope = PollScope {
        owner: config.identity.user_id,
        page: 0,
        size: config.poll.page_size,
    };
    let board = Arc::new(StatusBoard::new(scope));

    // Cancelled on Ctrl-C; the poller and every in-flight cycle hang off it.
    let shutdown = CancellationToken::new();
    let (poller, poll_rx) = PollerHandle::channel();

    let engine = PollingEngine::new(
        Services::from_backend(backend.clone()),
        config.identity.clone(),
        board.clone(),
        config.poll.interval(),
        shutdown.clone(),
    );

    let acquirer = Arc::new(Acquirer::new(acquisition, config.acquisition.clone()));
    let coordinator = Arc::new(Coordinator::new(
        backend.clone(),
        backend,
        acquirer,
        board.clone(),
        poller.clone(),
        config.identity.clone(),
        config.policy.clone(),
    ));

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            http::HttpState {
                board,
                coordinator,
                poller,
                logs: recent_logs,
            },
        );
    }

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    info!("Daemon initialised, running poller");
    engine.run(poll_rx).await;

    info!("Daemon stopped");
    Ok(())
}
