// ── Device server ──
//
// Accept loop plus per-connection workers. The loop never waits on a
// request: every connection gets its own task, tracked so shutdown can let
// in-flight exchanges finish.

mod dispatch;
mod route;
mod worker;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, info, info_span, warn};

use crate::burrow::Burrow;
use crate::config::ServerConfig;
use crate::error::CoreError;
use crate::store::ChoreographyLibrary;

pub use dispatch::{BOOT_CODE_FILE, Dispatcher};
pub use route::Route;

/// The device-facing TCP server.
#[derive(Debug)]
pub struct MicroServer {
    config: ServerConfig,
    burrow: Arc<Burrow>,
    library: Arc<ChoreographyLibrary>,
}

impl MicroServer {
    pub fn new(config: ServerConfig, burrow: Arc<Burrow>, library: Arc<ChoreographyLibrary>) -> Self {
        Self {
            config,
            burrow,
            library,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn burrow(&self) -> &Arc<Burrow> {
        &self.burrow
    }

    pub fn library(&self) -> &Arc<ChoreographyLibrary> {
        &self.library
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, CoreError> {
        Ok(TcpListener::bind(self.config.listen).await?)
    }

    /// Serve `listener` until `cancel` fires, then wait for in-flight
    /// workers.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<(), CoreError> {
        let bound = listener.local_addr()?;
        let locate_address = self.config.locate_address(bound);
        info!(%bound, locate = %locate_address, "listening for bunnies");

        let dispatcher = Arc::new(Dispatcher::new(
            self.config,
            self.burrow,
            self.library,
            locate_address,
        ));
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        tracker.spawn(
                            worker::run(stream, dispatcher).instrument(info_span!("worker", %peer)),
                        );
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
            }
        }

        tracker.close();
        info!(in_flight = tracker.len(), "shutting down, waiting for workers");
        tracker.wait().await;
        info!("server stopped");
        Ok(())
    }
}
