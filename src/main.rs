use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use photoframe::{api, cli, config, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "photoframe=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Selection { command }) => {
            let state = AppState::new(cfg)?;
            handle_selection_command(command, &state).await
        }
        Some(cli::Commands::Auth { command }) => {
            let state = AppState::new(cfg)?;
            handle_auth_command(command, &state).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let bind = cfg.bind.clone();
    let flow_timeout = cfg.pick_flow_timeout;

    tracing::info!(
        tokens = %cfg.tokens_path.display(),
        selection = %cfg.selection_path.display(),
        picker = %cfg.picker_api_base,
        "Initializing state..."
    );
    let state = AppState::new(cfg)?;

    let initial = state.selection.load().await;
    tracing::info!(count = initial.len(), "Loaded saved selection");
    if !state.tokens.status().await.authorized {
        tracing::warn!("No stored credentials; visit /pick to authorize");
    }

    let app = api::router(state.clone());

    // Finished flows are kept for one full flow lifetime past their last update.
    jobs::cleanup::spawn(state.flows.clone(), flow_timeout * 2);
    tracing::info!("Background cleanup job started (stale pick flows every 5m)");

    let ip: std::net::IpAddr = bind
        .parse()
        .with_context(|| format!("invalid PHOTOFRAME_BIND address: {}", bind))?;
    let addr = SocketAddr::new(ip, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("photoframe listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn handle_selection_command(
    cmd: cli::SelectionCommands,
    state: &Arc<AppState>,
) -> anyhow::Result<()> {
    match cmd {
        cli::SelectionCommands::Show => {
            let Some(selection) = state.selection.try_load().await? else {
                println!("No selection saved ({}).", state.selection.path().display());
                return Ok(());
            };
            if let Some(saved_at) = selection.saved_at {
                println!("Saved: {}", saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if selection.items.is_empty() {
                println!("Selection is empty.");
                return Ok(());
            }
            println!("{:<6} {:<8} {:<40} CREATED", "INDEX", "KIND", "FILENAME");
            for (i, item) in selection.items.iter().enumerate() {
                println!(
                    "{:<6} {:<8} {:<40} {}",
                    i,
                    item.kind().as_str(),
                    item.filename,
                    item.creation_time
                        .map(|t| t.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "-".into())
                );
            }
        }
        cli::SelectionCommands::Clear => {
            if state.selection.clear().await? {
                println!("Selection cleared.");
            } else {
                println!("No selection to clear.");
            }
        }
    }
    Ok(())
}

async fn handle_auth_command(cmd: cli::AuthCommands, state: &Arc<AppState>) -> anyhow::Result<()> {
    match cmd {
        cli::AuthCommands::Status => {
            let status = state.tokens.status().await;
            println!("Authorized: {}", status.authorized);
            if let Some(expires_at) = status.expires_at {
                println!("Access token expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if !status.scopes.is_empty() {
                println!("Scopes: {}", status.scopes.join(" "));
            }
        }
        cli::AuthCommands::Logout => {
            if state.tokens.clear().await? {
                println!("Stored credentials removed.");
            } else {
                println!("No stored credentials.");
            }
        }
    }
    Ok(())
}
