//! SQLite access for the `sqlite` storage backend.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;

mod migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

struct Worker {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel ends the worker's receive loop.
        self.jobs
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("usage database thread panicked");
            }
        }
    }
}

/// Handle to a SQLite connection that lives on its own thread.
///
/// Clones share the thread; it exits once the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("pctimer-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for job in jobs_rx {
                    job(&mut conn);
                }
                debug!("usage database thread exiting");
            })
            .context("failed to spawn usage database thread")?;

        ready_rx
            .recv()
            .context("usage database thread died during startup")??;
        info!("Usage database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Mutex::new(Some(jobs_tx)),
                thread: Some(thread),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `task` against the connection and waits for its result.
    ///
    /// Blocks the calling thread; async callers go through `spawn_blocking`.
    pub fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .ok_or_else(|| anyhow!("usage database is closed"))?
            .send(job)
            .map_err(|_| anyhow!("usage database thread has stopped"))?;

        reply_rx
            .recv()
            .map_err(|_| anyhow!("usage database thread dropped the request"))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("Could not switch {} to WAL mode: {err}", path.display());
    }

    migrations::run_migrations(&mut conn)?;
    Ok(conn)
}
