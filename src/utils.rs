//utils for graceful shutdown that can be used from
//any module in the project
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    //spawn once to listen for ctrl-c
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => tc.cancel(),
            // without a handler the process just runs to completion
            Err(e) => warn!("failed to install ctrl+C handler: {}", e),
        }
    });
    token
}
