use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_audit::{events, AuditFilter, AuditRecorder, ExportFormat, NewEvent, Severity};
use warden_server::{create_router, jobs, AppState, Config};

#[derive(Parser)]
#[command(name = "warden-server")]
#[command(about = "Account security service: HTTP API and operator tasks")]
struct Cli {
    /// Defaults to `serve`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and background jobs
    Serve,
    /// Recompute the audit hash chain
    VerifyAudit {
        /// First sequence to check
        #[arg(long)]
        from: Option<u64>,

        /// Last sequence to check
        #[arg(long)]
        to: Option<u64>,
    },
    /// Export audit events
    ExportAudit {
        /// json, csv or xml
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Lower time bound (unix seconds)
        #[arg(long)]
        from: Option<u64>,

        /// Upper time bound (unix seconds)
        #[arg(long)]
        to: Option<u64>,
    },
    /// Run one pass of every maintenance job
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let state = Arc::new(AppState::new(config).await?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(state).await,
        Commands::VerifyAudit { from, to } => verify_audit(&state, from, to).await,
        Commands::ExportAudit {
            format,
            output,
            from,
            to,
        } => export_audit(&state, &format, output, from, to).await,
        Commands::Sweep => sweep(&state).await,
    }
}

async fn serve(state: Arc<AppState>) -> Result<()> {
    state.record_config_loaded().await?;
    if let Some(issued) = state.bootstrap_admin().await? {
        // Printed for the operator only; never routed through tracing.
        println!(
            "Bootstrap administrator created. Retrieve its temporary password with \
             POST /auth/password/retrieve using token: {}",
            issued.retrieval_token
        );
    }

    let bind_address = state.config.bind_address;
    tracing::info!("Starting warden server on {}", bind_address);

    let background = jobs::spawn_background_jobs(Arc::clone(&state));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on {}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    for handle in background {
        handle.abort();
    }
    Ok(())
}

async fn verify_audit(state: &AppState, from: Option<u64>, to: Option<u64>) -> Result<()> {
    let report = state.audit.verify_integrity(from, to).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_intact() {
        anyhow::bail!(
            "audit chain has {} divergence(s), first at sequence {}",
            report.divergences.len(),
            report.divergences[0].sequence
        );
    }
    Ok(())
}

async fn export_audit(
    state: &AppState,
    format: &str,
    output: Option<PathBuf>,
    from: Option<u64>,
    to: Option<u64>,
) -> Result<()> {
    let format = ExportFormat::parse(format)
        .ok_or_else(|| anyhow::anyhow!("unknown export format: {}", format))?;
    let filter = AuditFilter {
        from,
        to,
        limit: Some(AuditFilter::MAX_LIMIT),
        ..Default::default()
    };
    let body = state.audit.export(&filter, format).await?;

    state
        .audit
        .record(
            NewEvent::new(events::AUDIT_EXPORT, Severity::Warning).details(serde_json::json!({
                "format": format.extension(),
                "bytes": body.len(),
                "source": "cli",
            })),
        )
        .await?;

    match output {
        Some(path) => {
            std::fs::write(&path, body)?;
            tracing::info!(path = %path.display(), "Audit export written");
        }
        None => println!("{}", body),
    }
    Ok(())
}

async fn sweep(state: &AppState) -> Result<()> {
    jobs::deletion_sweep(state).await?;
    jobs::expire_promotions(state).await?;
    jobs::purge_expired(state).await?;
    jobs::detect_anomalies(state).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Graceful shutdown initiated");
}
