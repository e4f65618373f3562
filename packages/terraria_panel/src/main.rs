use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use terraria_panel::config::{self, FileConfig};
use terraria_panel::{AppState, ConsoleBroadcast, DiscordNotifier, create_router};
use terraria_pty::{LogNotifier, Notifier, TerrariaPty};

#[derive(Parser)]
#[command(name = "panel")]
#[command(about = "Supervise a Terraria dedicated server and control it from the browser")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding config.toml (defaults to the working directory)
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server and the control panel (default)
    Run(RunArgs),
    /// Write a default config.toml into the data directory
    Init(InitArgs),
}

#[derive(Args, Default)]
struct RunArgs {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct InitArgs {
    /// Overwrite an existing config.toml
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init(args)) => {
            init_logging(false);
            let path = config::write_default_config(&cli.data_dir, args.force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Some(Commands::Run(args)) => run(cli.data_dir, args).await,
        None => run(cli.data_dir, RunArgs::default()).await,
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "terraria_panel=debug,terraria_pty=debug,tower_http=debug,info"
    } else {
        "terraria_panel=info,terraria_pty=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

async fn run(data_dir: PathBuf, args: RunArgs) -> Result<()> {
    init_logging(args.debug);

    let file_config: FileConfig = config::load_config(&data_dir)
        .extract()
        .context("Failed to load configuration")?;

    info!("Starting Terraria control panel");

    let notifier: Arc<dyn Notifier> = if file_config.discord.enabled {
        info!(
            "Announcing players to Discord channel {}",
            file_config.discord.channel_id
        );
        Arc::new(
            DiscordNotifier::from_config(&file_config.discord)
                .context("Invalid Discord configuration")?,
        )
    } else {
        info!("Discord disabled, announcements go to the log");
        Arc::new(LogNotifier)
    };

    let console = Arc::new(ConsoleBroadcast::new());
    let pty = TerrariaPty::builder(file_config.terraria.launch_args())
        .notifier(notifier.clone())
        .consumer(console.clone())
        .kill_timeout(file_config.terraria.kill_timeout())
        .start()
        .await
        .context("Failed to start Terraria server")?;

    let state = AppState {
        pty: pty.clone(),
        notifier,
        console,
        header: Arc::from(file_config.web.header.as_str()),
    };
    if let Some(dir) = &file_config.web.static_dir {
        info!("Serving static files from {}", dir.display());
    }
    let app = create_router(state, file_config.web.static_dir.clone());

    let addr = format!("{}:{}", file_config.web.host, file_config.web.port)
        .parse::<SocketAddr>()
        .context("Invalid web.host / web.port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Control panel listening on http://{}", actual_addr);
    info!("  POST   /cmd          - Run dusk, dawn, noon, midnight or hardReset");
    info!("  GET    /console      - WebSocket console stream");
    info!("  GET    /api/status   - Server state and online players");
    info!("  GET    /health       - Liveness probe");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    let server_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error");

    info!("Stopping Terraria server...");
    if let Err(e) = pty.shutdown().await {
        warn!("Failed to stop the Terraria server cleanly: {}", e);
    }

    server_result
}
