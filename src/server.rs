use crate::config::{Listen, Settings};
use crate::errors::Result;
use crate::library::Library;
use crate::live::LiveRegistry;
use crate::locations::{blob_dir, db_dir};
use crate::routes;
use crate::storage::{BlobStore, RecordStore, SledStore};

use std::sync::Arc;
use tokio::signal;
use tokio_stream::wrappers::UnixListenerStream;

/// Everything the request handlers share.
pub(crate) struct AppState {
    pub(crate) library: Arc<Library>,
    pub(crate) live: LiveRegistry,
}

pub(crate) struct Server {
    state: Arc<AppState>,
    listen: Listen,
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Could not listen for shutdown signal: {}", e);
    }
}

impl Server {
    pub(crate) async fn start(&self) -> Result<()> {
        let filter = routes::routes(self.state.clone());
        match &self.listen {
            Listen::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                let listener = tokio::net::UnixListener::bind(path)?;
                tracing::info!("Listening on {}", path.display());
                let incoming = UnixListenerStream::new(listener);
                warp::serve(filter)
                    .serve_incoming_with_graceful_shutdown(incoming, shutdown_signal())
                    .await;
            }
            Listen::Tcp(port) => {
                let (addr, server) = warp::serve(filter)
                    .try_bind_with_graceful_shutdown(([127, 0, 0, 1], *port), shutdown_signal())
                    .map_err(|e| {
                        std::io::Error::new(std::io::ErrorKind::AddrInUse, e.to_string())
                    })?;
                tracing::info!("Listening on {}", addr);
                server.await;
            }
        }
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        println!("Shutting down server...");
        if let Listen::Unix(path) = &self.listen {
            let _ = std::fs::remove_file(path);
        }
    }
}

pub(crate) fn get_server(settings: &Settings) -> Result<Server> {
    let store: Arc<dyn RecordStore> = Arc::new(SledStore::open(&db_dir(&settings.storage_dir))?);
    let blobs = BlobStore::new(blob_dir(&settings.storage_dir))?;
    let library = Arc::new(Library::new(store.clone(), blobs, settings.quota));
    let live = LiveRegistry::new(store, settings.refresh_interval);
    Ok(Server {
        state: Arc::new(AppState { library, live }),
        listen: settings.listen.clone(),
    })
}
