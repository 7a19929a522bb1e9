use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use copilot_mcp::config::Config;
use copilot_mcp::state::AppContext;
use copilot_mcp::transport::stdio::LineTransport;
use copilot_mcp::transport::TransportKind;

/// `RUST_LOG` wins, then `LOG_LEVEL`, then `info`.
fn env_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    std::env::var("LOG_LEVEL")
        .ok()
        .filter(|level| !level.trim().is_empty())
        .and_then(|level| EnvFilter::try_new(level.trim()).ok())
        .unwrap_or_else(|| "info".into())
}

fn init_tracing() {
    // stdout belongs to the line transport; logs go to stderr.
    let env_filter = env_filter();
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let ctx = AppContext::from_config(&config)?;

    match config.transport {
        TransportKind::Stdio => {
            let dispatcher = copilot_mcp::build_dispatcher(&ctx)?;
            tracing::info!("copilot-mcp serving JSON-RPC over stdio");
            let stdin = BufReader::new(tokio::io::stdin());
            LineTransport::stdout().serve(stdin, dispatcher).await?;
        }
        TransportKind::Sse => {
            let app = copilot_mcp::create_router(&ctx)?;
            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));

            tracing::info!("copilot-mcp listening on http://{} (POST /rpc, GET /events)", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    tracing::info!(uptime_secs = ctx.uptime().as_secs(), "copilot-mcp stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
