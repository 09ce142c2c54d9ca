use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use projektwald::api::{self, RpcRequest, RpcResponse};
use projektwald::error::AppError;
use projektwald::state::AppState;

/// Hosts the RPC dispatch over stdin/stdout JSON lines: one request object
/// per line in, one response envelope per line out. The UI process owns the
/// other end of the pipe.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging (stderr + tägliche Datei-Rotation unter ./logs; stdout gehört
    // dem RPC-Kanal)
    std::fs::create_dir_all("logs").ok();
    let (stderr_nb, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let file_appender = tracing_appender::rolling::daily("logs", "projektwald.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stderr_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Guards am Leben halten, damit Non-Blocking Writer korrekt flushen
    let _log_guards = (stderr_guard, file_guard);

    // Load configuration (embedded defaults -> projektwald.toml -> env/.env)
    let app_cfg = projektwald::config::load()?;
    let state = AppState::new(app_cfg).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let loaded = state.index.len().await;
    info!(
        "Projektwald ready, catalog at {} ({} projects)",
        state.store.catalog_path().display(),
        loaded
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<RpcRequest>(&line) {
                    Ok(request) => api::handle(&state, request).await,
                    Err(e) => RpcResponse::err(
                        None,
                        &AppError::InvalidInput(format!("invalid request: {}", e)),
                    ),
                };
                let mut payload = serde_json::to_vec(&response)?;
                payload.push(b'\n');
                stdout.write_all(&payload).await?;
                stdout.flush().await?;
            }
            _ = &mut shutdown => break,
        }
    }

    // Letzter expliziter Flush, damit keine debounced Mutation verloren geht
    if let Err(e) = state.store.flush().await {
        tracing::warn!("final catalog flush failed: {}", e);
    }
    info!("Shutdown signal received. Stopping backend...");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
