//! Echo service demo.
//!
//! Serves an application that echoes the request body, showing the full
//! deployment shape: single-process serving by default, and the
//! supervisor/worker split when `GANGWAY_WORKERS` is set above 1. Worker
//! processes detect the listener they inherited and serve it instead of
//! binding.
//!
//! ```text
//! GANGWAY_BIND=127.0.0.1:8443 GANGWAY_WORKERS=4 demo-echo-server
//! ```

use bytes::Bytes;
use gangway::prelude::*;

/// Echoes the request body back with a 200.
async fn echo(
    scope: Scope,
    mut receiver: BodyReceiver,
    mut sender: ResponseSender,
) -> Result<(), AppError> {
    let mut body = Vec::new();
    loop {
        let message = receiver.recv().await;
        body.extend_from_slice(message.body());
        if message.is_last() {
            break;
        }
    }

    tracing::info!(
        method = scope.method(),
        path = scope.path(),
        bytes = body.len(),
        "echoing request"
    );

    sender.send(OutboundMessage::start(StatusCode::OK)).await?;
    sender
        .send(OutboundMessage::body(Bytes::from(body)))
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LogConfig::development())?;

    let bind_addr =
        std::env::var("GANGWAY_BIND").unwrap_or_else(|_| "127.0.0.1:8443".to_string());
    let workers = std::env::var("GANGWAY_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let config = ServerConfig::builder()
        .bind_addr(bind_addr)
        .worker_num(workers)
        .build();

    #[cfg(unix)]
    {
        // A worker process serves the socket its supervisor handed down.
        if let Some(listener) = gangway::inherited_listener() {
            let server = Server::new(config, echo);
            server
                .run_on_listener(listener?, ShutdownSignal::with_os_signals())
                .await?;
            return Ok(());
        }

        if config.worker_num() > 1 {
            gangway::Supervisor::new(config).run().await?;
            return Ok(());
        }
    }

    Server::new(config, echo).run().await?;
    Ok(())
}
