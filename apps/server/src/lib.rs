//! # PLM Server
//!
//! HTTP server for versioned documents, parts and change management, built on `Axum`,
//! the embedded `plm-database` and a typed event bus.
//!
//! ## Example
//! ```no_run
//! use plm_server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Server::builder()
//!         .port(4583)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

mod router;

use anyhow::{Context, Result, bail};
use axum::Router;
use axum_server::Handle;
use plm::domain::config::ApiConfig;
use plm::kernel::server::ApiState;
use plm_database::Database;
use plm_event_bus::EventBus;
use plm_storage::{Compression, Storage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Grace period for in-flight requests after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// A fluent builder for configuring and initializing the [`Server`].
#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    cfg: ApiConfig,
}

impl ServerBuilder {
    pub fn config(mut self, cfg: ApiConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.cfg.server.port = port;
        self
    }

    async fn init_storage(&self) -> Result<Storage> {
        let storage_cfg = &self.cfg.storage;
        let compression = match storage_cfg.compression.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Compression::None,
            "lz4" => Compression::Lz4,
            other => bail!("Unknown storage compression '{other}' (expected 'none' or 'lz4')"),
        };

        Storage::builder()
            .root(&storage_cfg.data_dir)
            .compression(compression)
            .connect()
            .await
            .context("Failed to open the attachment store")
    }

    async fn init_database(&self, storage: &Storage) -> Result<Database> {
        let mut builder = Database::builder();
        if self.cfg.database.snapshot {
            builder = builder.snapshot(storage.clone());
        }
        builder.init().await.context("Failed to restore the database snapshot")
    }

    fn validate_ssl_config(&self) -> Result<()> {
        if let Some(ssl) = &self.cfg.server.ssl {
            if !ssl.cert.exists() {
                bail!("SSL certificate not found at: {}", ssl.cert.display());
            }
            if !ssl.key.exists() {
                bail!("SSL key not found at: {}", ssl.key.display());
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let metadata = ssl.key.metadata()?;
                if metadata.permissions().mode() & 0o077 != 0 {
                    warn!(key = %ssl.key.display(), "SSL private key has insecure permissions (should be 600)");
                }
            }
        }
        Ok(())
    }

    /// Consumes the builder and initializes the server.
    ///
    /// # Process
    /// 1. Validates the SSL files
    /// 2. Opens the attachment store and restores the database snapshot
    /// 3. Initializes the enabled feature slices on a fresh event bus
    /// 4. Constructs the application state
    ///
    /// # Errors
    /// Returns an error if:
    /// * SSL certificate/key files are missing
    /// * The storage root cannot be created or the compression name is unknown
    /// * The snapshot cannot be read or decoded
    /// * A slice fails to initialize or the JWT configuration is unusable
    pub async fn build(self) -> Result<Server> {
        self.validate_ssl_config()?;

        let address = SocketAddr::new(self.cfg.server.address, self.cfg.server.port);
        info!(address = %address, workspaces = self.cfg.workspaces.len(), "Initializing server");

        let storage = self.init_storage().await?;
        let database = self.init_database(&storage).await?;

        let events = EventBus::new();
        let slices = plm::init(&self.cfg, &database, &storage, &events).context("Platform bootstrap failed")?;

        let state = ApiState::builder()
            .config(self.cfg)
            .db(database)
            .storage(storage)
            .events(events)
            .register_slices(slices)
            .build()
            .context("Failed to finalize API state registry")?;
        Ok(Server { state })
    }
}

/// A fully initialized server instance ready to run.
#[must_use = "call .run().await to start the server"]
#[derive(Debug)]
pub struct Server {
    state: ApiState,
}

impl Server {
    /// Returns a new [`ServerBuilder`] to configure the server.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The assembled HTTP application: every route, the body limit, request tracing and
    /// the Scalar UI at `/api`.
    pub fn app(&self) -> Router {
        router::init(self.state.clone())
    }

    /// Serves until a shutdown signal arrives, then saves the database snapshot.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the configured address,
    /// TLS setup fails, or the final snapshot cannot be written.
    pub async fn run(self) -> Result<()> {
        let cfg = self.state.config.clone();
        let address = SocketAddr::new(cfg.server.address, cfg.server.port);
        info!(address = %address, ssl = cfg.server.ssl.is_some(), slices = ?self.state.slice_names(), "Starting server");

        let app = self.app();

        let handle = Handle::<SocketAddr>::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = shutdown_signal().await {
                error!("Error while waiting for shutdown signal: {e}");
                return;
            }
            info!("Shutdown signal received, starting graceful shutdown");
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        if let Some(ssl_config) = &cfg.server.ssl {
            info!("Starting HTTPS server on https://{address}");
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&ssl_config.cert, &ssl_config.key)
                .await
                .context("Failed to load SSL/TLS certificates")?;

            axum_server::bind_rustls(address, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        } else {
            info!("Starting HTTP server on http://{address}");
            axum_server::bind(address)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }

        self.shutdown().await
    }

    /// Saves the snapshot (when enabled) and closes the event bus.
    ///
    /// # Errors
    /// Returns an error when the snapshot cannot be written.
    pub async fn shutdown(self) -> Result<()> {
        let tables = self.state.database.save_snapshot().await.context("Failed to save the database snapshot")?;
        let channels = self.state.events.shutdown();
        info!(tables, channels, "Server shutdown complete");
        Ok(())
    }

    #[must_use]
    pub const fn state(&self) -> &ApiState {
        &self.state
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => res?,
        res = terminate => res?,
    }

    Ok(())
}
