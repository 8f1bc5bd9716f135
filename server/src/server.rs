//! The top-level server (spec §4.6): binds the listener, owns every piece
//! of shared state a `Worker` needs, and fans accepted connections out to
//! workers round-robin.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use common::config::ServerConfig;
use common::err::SqliteServerError;
use common::server::Server as ServerLifecycle;
use engine::Engine;

use crate::allow_list::AllowList;
use crate::meta_db::MetaDb;
use crate::registry::ConnRegistry;
use crate::txn::{ConnIdSeq, WriteLock};
use crate::worker::{NewConnection, Worker, WorkerShared};

/// The MySQL-wire-compatible front end (spec §4.6 "Server"). Holds the
/// state every connection shares and a fixed pool of `Worker`s it
/// round-robins accepted sockets across.
pub struct SqliteServer {
    config: Arc<ServerConfig>,
    engine: Arc<dyn Engine>,
    meta: Arc<MetaDb>,
    write_lock: Arc<WriteLock>,
    allow_list: Arc<AllowList>,
    conn_ids: Arc<ConnIdSeq>,
    registry: Arc<ConnRegistry>,
    workers: Vec<Worker>,
    shutdown: Arc<Notify>,
    accept_task: Option<JoinHandle<()>>,
}

impl SqliteServer {
    pub fn new(config: ServerConfig, engine: Arc<dyn Engine>) -> Self {
        SqliteServer {
            config: Arc::new(config),
            engine,
            meta: Arc::new(MetaDb::new()),
            write_lock: Arc::new(WriteLock::new()),
            allow_list: Arc::new(AllowList::new()),
            conn_ids: Arc::new(ConnIdSeq::new()),
            registry: Arc::new(ConnRegistry::new()),
            workers: Vec::new(),
            shutdown: Arc::new(Notify::new()),
            accept_task: None,
        }
    }

    /// The meta database handle, so a caller (e.g. `initdb`, or an admin
    /// command surface) can bootstrap or inspect it before/without a
    /// listener running.
    pub fn meta(&self) -> &Arc<MetaDb> {
        &self.meta
    }

    pub fn allow_list(&self) -> &Arc<AllowList> {
        &self.allow_list
    }

    pub fn registry(&self) -> &Arc<ConnRegistry> {
        &self.registry
    }

    /// Whether the accept loop is actually bound and running. `start` can't
    /// report a bind failure through the `Server` trait's `()` return, so
    /// the CLI binary checks this afterward instead (grounded in the
    /// teacher's `RelayLogServer::is_running`).
    pub fn is_listening(&self) -> bool {
        self.accept_task.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn shared(&self) -> Arc<WorkerShared> {
        Arc::new(WorkerShared {
            engine: self.engine.clone(),
            meta: self.meta.clone(),
            write_lock: self.write_lock.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            conn_ids: self.conn_ids.clone(),
            allow_list: self.allow_list.clone(),
        })
    }

    async fn bind_and_accept(&mut self) -> Result<(), SqliteServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await.map_err(SqliteServerError::Io)?;
        info!(%addr, "listening");

        let shared = self.shared();
        for id in 0..self.config.worker_count.max(1) {
            self.workers.push(Worker::spawn(id, shared.clone()));
        }

        let workers = self.workers.clone();
        let next_worker = Arc::new(AtomicUsize::new(0));
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((socket, addr)) => {
                                let host = addr.ip().to_string();
                                let idx = next_worker.fetch_add(1, Ordering::Relaxed) % workers.len();
                                if let Err(_conn) = workers[idx].try_offer(NewConnection { socket, peer_host: host }) {
                                    warn!(worker = idx, "worker saturated, dropping connection");
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "accept failed");
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        info!("accept loop shutting down");
                        break;
                    }
                }
            }
        });
        self.accept_task = Some(task);
        Ok(())
    }
}

#[async_trait]
impl ServerLifecycle for SqliteServer {
    async fn start(&mut self) {
        if let Err(e) = self.bind_and_accept().await {
            error!(error = %e, "failed to start sqlited-server");
        }
    }

    async fn shutdown(&mut self, graceful: bool) -> Result<(), SqliteServerError> {
        self.shutdown.notify_waiters();
        if let Some(task) = self.accept_task.take() {
            if graceful {
                let _ = task.await;
            } else {
                task.abort();
            }
        }
        Ok(())
    }
}
