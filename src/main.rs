//! URL shortener service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id → trace → metrics → gzip → security headers → CORS
//!                         → panic recovery → request timeout → handler
//!                                                                 │
//!                                                                 ▼
//!                                                      ShortenerService
//!                                                                 │
//!                                                                 ▼
//!                                                 LinkStore (Postgres, observed)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use shortener::config::load_config;
use shortener::http::HttpServer;
use shortener::lifecycle::{self, Shutdown};
use shortener::observability::{self, LogSink};
use shortener::resilience::install_panic_hook;

#[derive(Parser)]
#[command(name = "url-shortener")]
#[command(about = "HTTP service that shortens URLs and redirects short codes", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let sink = LogSink::stdout();
    observability::logging::init(&config.observability, sink.clone());
    install_panic_hook();

    tracing::info!(
        environment = config.environment.as_str(),
        bind_address = %config.listener.bind_address(),
        request_timeout = ?config.timeouts.request_timeout(),
        "url-shortener v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = match lifecycle::connect_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            sink.flush();
            std::process::exit(1);
        }
    };
    let service = lifecycle::build_service(&config, store.clone());

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, service, sink.clone());
    let mut handle = tokio::spawn(server.run(listener, shutdown.signalled()));

    tokio::select! {
        _ = lifecycle::wait_for_signal() => {
            shutdown.trigger();
            lifecycle::drain(handle, config.timeouts.shutdown_grace()).await;
        }
        joined = &mut handle => match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
            Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        },
    }

    store.close().await;
    tracing::info!("Shutdown complete");
    sink.flush();
    Ok(())
}
