use inkwell_common::model::auth::PositiveDuration;
use inkwell_db::{
    client::DbClient,
    memory::MemoryStorage,
    storage::{DbError, DynStorage},
};
use serde::Deserialize;
use server::{AuthSettings, IndexCache, ServerState};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("DATABASE_URL must be set for the postgres storage backend")]
    MissingDatabaseUrl,
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

fn default_max_connections() -> u32 {
    5
}

fn default_index_cache_seconds() -> u64 {
    20
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    #[serde(default)]
    storage_backend: StorageBackend,
    database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    database_max_connections: u32,
    #[serde(default = "default_index_cache_seconds")]
    index_cache_seconds: u64,
    auth_token_lifetime_seconds: Option<u64>,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "inkwell_api=debug,inkwell_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn connect_storage(env: &Env) -> Result<DynStorage, InitError> {
    match env.storage_backend {
        StorageBackend::Postgres => {
            let database_url = env
                .database_url
                .as_deref()
                .ok_or(InitError::MissingDatabaseUrl)?;

            let client = DbClient::connect(database_url, env.database_max_connections).await?;
            client.migrate().await?;
            info!("Connected to postgres");

            Ok(Arc::new(client))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; nothing will survive a restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}

/// Cancels `token` on Ctrl-C or, on unix, SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                warn!(%err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutting down");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let storage = connect_storage(&env).await?;
    let state = ServerState {
        storage,
        index_cache: IndexCache::new(Duration::from_secs(env.index_cache_seconds)),
        auth_settings: AuthSettings {
            token_lifetime: env
                .auth_token_lifetime_seconds
                .and_then(|seconds| i64::try_from(seconds).ok())
                .map(time::Duration::seconds)
                .and_then(PositiveDuration::new),
        },
    };

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes().with_state(state).layer(tracing_layer);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
