use serde::Serialize;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::db;
use crate::session::SessionSnapshot;

/// Destination for session snapshots. Runs on the autosave worker thread.
pub trait SnapshotSink: Send + 'static {
    fn save(&mut self, snapshot: &SessionSnapshot) -> anyhow::Result<()>;
}

pub struct SqliteSink {
    conn: rusqlite::Connection,
}

impl SqliteSink {
    pub fn open(workspace: &std::path::Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }
}

impl SnapshotSink for SqliteSink {
    fn save(&mut self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let outcome = db::save_snapshot(&self.conn, snapshot)?;
        tracing::debug!(session_id = %snapshot.session_id, ?outcome, "snapshot saved");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveState {
    Idle,
    Pending,
    Saved,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveStatus {
    pub state: SaveState,
    pub save_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for AutosaveStatus {
    fn default() -> Self {
        Self {
            state: SaveState::Idle,
            save_count: 0,
            last_saved_at: None,
            last_error: None,
        }
    }
}

enum Command {
    Schedule(Box<SessionSnapshot>),
    Flush(Option<Box<SessionSnapshot>>, Sender<Result<(), String>>),
    Shutdown,
}

type SharedStatus = Arc<Mutex<AutosaveStatus>>;

fn lock(status: &SharedStatus) -> MutexGuard<'_, AutosaveStatus> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}

/// Debounced save scheduler. Every `schedule` restarts the quiet period;
/// once it elapses the newest snapshot goes to the sink. Dropping or
/// closing discards whatever is still pending.
pub struct Autosave {
    tx: Sender<Command>,
    status: SharedStatus,
    worker: Option<JoinHandle<()>>,
}

impl Autosave {
    pub fn spawn<S: SnapshotSink>(delay: Duration, sink: S) -> Self {
        let (tx, rx) = mpsc::channel();
        let status: SharedStatus = Arc::new(Mutex::new(AutosaveStatus::default()));
        let worker_status = Arc::clone(&status);
        let worker = std::thread::spawn(move || run_worker(rx, delay, sink, worker_status));
        Self {
            tx,
            status,
            worker: Some(worker),
        }
    }

    pub fn schedule(&self, snapshot: SessionSnapshot) {
        lock(&self.status).state = SaveState::Pending;
        if self.tx.send(Command::Schedule(Box::new(snapshot))).is_err() {
            tracing::warn!("autosave worker is gone; edit not scheduled");
        }
    }

    /// Saves `snapshot` (or whatever is pending) now and waits for the result.
    pub fn flush(&self, snapshot: Option<SessionSnapshot>) -> Result<(), String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Flush(snapshot.map(Box::new), reply_tx))
            .map_err(|_| "autosave worker stopped".to_string())?;
        reply_rx
            .recv()
            .map_err(|_| "autosave worker stopped".to_string())?
    }

    pub fn status(&self) -> AutosaveStatus {
        lock(&self.status).clone()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.tx.send(Command::Shutdown);
        if worker.join().is_err() {
            tracing::error!("autosave worker panicked");
        }
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<S: SnapshotSink>(
    rx: Receiver<Command>,
    delay: Duration,
    mut sink: S,
    status: SharedStatus,
) {
    let mut pending: Option<Box<SessionSnapshot>> = None;
    loop {
        let cmd = if pending.is_some() {
            match rx.recv_timeout(delay) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        match cmd {
            None => {
                if let Some(snapshot) = pending.take() {
                    // Fire-and-forget: failure is recorded, edits stay in memory.
                    let _ = save_with_status(&mut sink, &snapshot, &status);
                }
            }
            Some(Command::Schedule(snapshot)) => {
                pending = Some(snapshot);
            }
            Some(Command::Flush(explicit, reply)) => {
                let target = explicit.or_else(|| pending.take());
                pending = None;
                let result = match target {
                    Some(snapshot) => save_with_status(&mut sink, &snapshot, &status),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            Some(Command::Shutdown) => {
                if pending.is_some() {
                    tracing::debug!("discarding pending autosave on close");
                }
                break;
            }
        }
    }
}

fn save_with_status<S: SnapshotSink>(
    sink: &mut S,
    snapshot: &SessionSnapshot,
    status: &SharedStatus,
) -> Result<(), String> {
    match sink.save(snapshot) {
        Ok(()) => {
            let mut st = lock(status);
            st.state = SaveState::Saved;
            st.save_count += 1;
            st.last_saved_at = Some(chrono::Utc::now().to_rfc3339());
            st.last_error = None;
            Ok(())
        }
        Err(e) => {
            tracing::warn!(session_id = %snapshot.session_id, error = %e, "autosave failed");
            let mut st = lock(status);
            st.state = SaveState::Failed;
            st.last_error = Some(e.to_string());
            Err(e.to_string())
        }
    }
}
