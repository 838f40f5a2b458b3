use clap::Parser;

use lsp_ws_bridge::config::{self, Config};
use lsp_ws_bridge::log;
use lsp_ws_bridge::ws::Server;

/// Exposes a Language Server Protocol backend to websocket clients.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on (host:port)
    #[arg(long)]
    listen: Option<String>,

    /// Websocket route that accepts upgrades
    #[arg(long)]
    path: Option<String>,

    /// Backend command line, e.g. "pyls -v"
    #[arg(long)]
    backend: Option<String>,

    /// Origin allowed to connect; repeat the flag for several.
    /// When none are given, any origin is accepted.
    #[arg(long = "allowed-origin")]
    allowed_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = log::init()?;

    let listen = config::resolve_listen(
        args.listen.as_deref(),
        std::env::var("LSP_WS_LISTEN").ok().as_deref(),
    )?;
    let backend = config::resolve_backend(
        args.backend.as_deref(),
        std::env::var("LSP_WS_BACKEND").ok().as_deref(),
    )?;

    let config = Config {
        listen,
        route: args.path.unwrap_or_else(|| config::DEFAULT_ROUTE.to_string()),
        backend,
        allowed_origins: args.allowed_origins,
    };

    let server = Server::bind(config).await?;
    server.run().await
}
