// ── Connection worker ──
//
// One task per accepted connection: read one request, write one response,
// close. Errors end only this exchange.

use std::sync::Arc;

use nabd_proto::Request;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use super::dispatch::Dispatcher;
use crate::error::CoreError;

pub(crate) async fn run(stream: TcpStream, dispatcher: Arc<Dispatcher>) {
    match exchange(stream, &dispatcher).await {
        Ok(()) => trace!("exchange complete"),
        Err(err) if err.is_malformed() => debug!(error = %err, "closing without response"),
        Err(err) => warn!(error = %err, "exchange failed"),
    }
}

async fn exchange(mut stream: TcpStream, dispatcher: &Dispatcher) -> Result<(), CoreError> {
    let config = dispatcher.config();
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let request = tokio::time::timeout(
        config.request_timeout,
        Request::read_from(&mut reader, &config.limits),
    )
    .await
    .map_err(|_| CoreError::malformed("timed out waiting for request"))??;

    let response = dispatcher.respond(&request).await?;
    trace!(status = response.status().code(), bytes = response.body().len(), "responding");

    response.write_to(&mut write_half, &config.throttle).await?;
    write_half.shutdown().await?;
    Ok(())
}
