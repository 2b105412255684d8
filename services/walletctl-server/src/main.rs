//! walletctl Server - Wallet balance requests over a line feed
//!
//! Reads decrypted requests from the transport as newline-delimited JSON on
//! stdin and writes one response envelope per line to stdout. Logs go to
//! stderr.
//!
//! # Quick Start
//!
//! ```bash
//! # Register an application and let it read the balance
//! walletctl-server register-app --name "my app" --pubkey <hex>
//! walletctl-server grant --pubkey <hex> --method get_balance
//! walletctl-server grant --pubkey <hex> --method pay_invoice --max-amount 3000 --renewal monthly
//!
//! # Serve requests
//! WALLETCTL_LND_URL=https://127.0.0.1:8080 walletctl-server serve < requests.ndjson
//! ```

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walletctl_db::{Database, DatabaseConfig};
use walletctl_service::{LndRestBackend, RequestHandler, ServiceConfig};
use walletctl_types::{
    Application, BudgetRenewal, InboundRequest, Method, PermissionGrant, PublicKey,
    RequestContext, Sats,
};

/// walletctl Server - Wallet Connect Balance Service
#[derive(Parser, Debug)]
#[command(
    name = "walletctl-server",
    about = "walletctl - Answer wallet balance requests within app budgets",
    version
)]
struct Args {
    /// SQLite database URL
    #[arg(long, env = "WALLETCTL_DATABASE_URL")]
    database_url: Option<String>,

    /// LND REST gateway URL
    #[arg(long, env = "WALLETCTL_LND_URL")]
    lnd_url: Option<String>,

    /// Per-request deadline in milliseconds
    #[arg(long, env = "WALLETCTL_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer requests read from stdin (default)
    Serve,

    /// Register a client application
    RegisterApp {
        #[arg(long)]
        name: String,
        /// Hex public key the application signs requests with
        #[arg(long)]
        pubkey: String,
    },

    /// Grant an application a method, optionally with a budget
    Grant {
        #[arg(long)]
        pubkey: String,
        #[arg(long)]
        method: Method,
        /// Budget in sats, 0 for unlimited
        #[arg(long, default_value = "0")]
        max_amount: i64,
        #[arg(long, default_value = "never")]
        renewal: BudgetRenewal,
        /// RFC 3339 expiry
        #[arg(long)]
        expires_at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // stdout carries responses, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut db_config = DatabaseConfig::from_env();
    if let Some(url) = args.database_url {
        db_config.url = url;
    }
    let mut service_config = ServiceConfig::from_env();
    if let Some(url) = args.lnd_url {
        service_config.lnd.url = url;
    }
    if let Some(timeout) = args.request_timeout_ms {
        service_config.request_timeout_ms = timeout;
    }

    let db = init_database(&db_config).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db, service_config).await,
        Command::RegisterApp { name, pubkey } => {
            let app = Application::new(name, PublicKey::parse(&pubkey)?);
            db.app_repo().insert(&app).await?;
            tracing::info!(app_id = %app.id, pubkey = %app.pubkey, "Registered application");
            Ok(())
        }
        Command::Grant {
            pubkey,
            method,
            max_amount,
            renewal,
            expires_at,
        } => {
            let pubkey = PublicKey::parse(&pubkey)?;
            let app = db
                .app_repo()
                .find_by_pubkey(&pubkey)
                .await?
                .with_context(|| format!("No application registered for {}", pubkey))?;

            let mut grant =
                PermissionGrant::new(app.id.clone(), method).with_budget(Sats(max_amount), renewal);
            if let Some(expires_at) = expires_at {
                grant = grant.with_expiry(expires_at);
            }
            db.permission_repo().upsert(&grant).await?;
            tracing::info!(
                app_id = %app.id,
                %method,
                max_amount,
                renewal = %renewal,
                "Granted permission"
            );
            Ok(())
        }
    }
}

/// Connect, migrate and verify the database
async fn init_database(config: &DatabaseConfig) -> anyhow::Result<Database> {
    let db = Database::connect(config).await?;
    db.migrate().await?;
    if !db.health_check().await {
        anyhow::bail!("Database health check failed");
    }
    Ok(db)
}

async fn serve(db: Database, config: ServiceConfig) -> anyhow::Result<()> {
    let backend = LndRestBackend::new(&config.lnd)?;
    let handler = RequestHandler::from_stores(
        Arc::new(db.request_event_repo()),
        Arc::new(db.permission_repo()),
        Arc::new(db.spend_repo()),
        Arc::new(backend),
    );

    tracing::info!(
        lnd = %config.lnd.url,
        timeout_ms = config.request_timeout_ms,
        "Serving balance requests from stdin"
    );

    let (tx, mut rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if let Err(e) = write_line(&mut stdout, &line).await {
                tracing::error!("Failed to write response: {}", e);
                break;
            }
        }
    });

    let handled = pump(
        BufReader::new(tokio::io::stdin()),
        &db,
        &handler,
        &config,
        &tx,
    )
    .await?;
    drop(tx);
    writer.await?;

    tracing::info!(handled, "Input closed, shutting down");
    Ok(())
}

/// Dispatch every request line of `input` to its own task and wait for all
/// of them. Finished tasks are reaped while reading. Returns the number of
/// requests dispatched.
async fn pump<R>(
    input: R,
    db: &Database,
    handler: &RequestHandler,
    config: &ServiceConfig,
    tx: &mpsc::Sender<String>,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut tasks = JoinSet::new();
    let mut dispatched = 0;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let request: InboundRequest = match serde_json::from_str(&line) {
                    Ok(request) => request,
                    Err(e) => {
                        tracing::warn!("Skipping malformed request line: {}", e);
                        continue;
                    }
                };
                tasks.spawn(answer(
                    db.clone(),
                    handler.clone(),
                    config.context(),
                    request,
                    tx.clone(),
                ));
                dispatched += 1;
            }
            Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                log_task_result(finished);
            }
        }
    }

    while let Some(finished) = tasks.join_next().await {
        log_task_result(finished);
    }
    Ok(dispatched)
}

/// Resolve the sender, run the pipeline and queue the envelope for stdout
async fn answer(
    db: Database,
    handler: RequestHandler,
    ctx: RequestContext,
    request: InboundRequest,
    tx: mpsc::Sender<String>,
) {
    let app = match db.app_repo().find_by_pubkey(&request.sender_pubkey).await {
        Ok(Some(app)) => app,
        Ok(None) => {
            tracing::warn!(
                sender = %request.sender_pubkey,
                origin_event_id = %request.origin_event_id,
                "Ignoring request from unknown application"
            );
            return;
        }
        Err(e) => {
            tracing::error!("Failed to look up application: {}", e);
            return;
        }
    };

    let envelope = match handler.handle(&ctx, &app, &request).await {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(origin_event_id = %request.origin_event_id, "{}", e);
            return;
        }
    };
    let line = match serde_json::to_string(&envelope) {
        Ok(line) => line,
        Err(e) => {
            tracing::error!("Failed to encode response: {}", e);
            return;
        }
    };
    if let Err(e) = tx.send(line).await {
        tracing::error!(
            origin_event_id = %request.origin_event_id,
            event_id = %envelope.request_event_id,
            "Response writer is gone, dropping response: {}",
            e
        );
    }
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!("Request task failed: {}", e);
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
