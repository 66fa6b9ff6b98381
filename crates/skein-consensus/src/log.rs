use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use skein_storage::{LogEntry, LogPayload, MeshStore};
use skein_types::{ApplyResult, Command, LogIndex, SkeinError, Term};

use crate::envelope::{encode_command, Encoding};
use crate::fsm::StateMachine;

// ---------------------------------------------------------------------------
// ConsensusLog trait
// Replication and leader election live behind this seam. A proposal resolves
// once the command is committed and applied locally.
// ---------------------------------------------------------------------------

pub trait ConsensusLog: Send + Sync + 'static {
    fn propose(&self, cmd: Command) -> impl Future<Output = Result<ApplyResult, SkeinError>> + Send;
}

// ---------------------------------------------------------------------------
// LocalLog: single replica, every proposal commits immediately
// ---------------------------------------------------------------------------

struct LogState {
    term: Term,
    last_index: LogIndex,
    entries: Vec<LogEntry>,
}

pub struct LocalLog<S: MeshStore> {
    fsm: Arc<StateMachine<S>>,
    encoding: Encoding,
    state: Mutex<LogState>,
}

impl<S: MeshStore> LocalLog<S> {
    /// Resume after the state machine's checkpoint. `term` is raised to the
    /// checkpoint term if it is behind, since older terms would be stale.
    pub async fn open(fsm: Arc<StateMachine<S>>, term: Term, encoding: Encoding) -> Result<Self, SkeinError> {
        let checkpoint = fsm.checkpoint().await?;
        let term = term.max(checkpoint.term).max(1);
        tracing::info!(term, last_index = checkpoint.index, ?encoding, "local log opened");
        Ok(LocalLog {
            fsm,
            encoding,
            state: Mutex::new(LogState { term, last_index: checkpoint.index, entries: Vec::new() }),
        })
    }

    pub fn state_machine(&self) -> &Arc<StateMachine<S>> {
        &self.fsm
    }

    /// Append a blank entry, as a new leader does on election.
    pub async fn heartbeat(&self) -> Result<ApplyResult, SkeinError> {
        self.append(LogPayload::Blank).await
    }

    /// Entries appended since the log was opened.
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().await.entries.clone()
    }

    async fn append(&self, payload: LogPayload) -> Result<ApplyResult, SkeinError> {
        let mut state = self.state.lock().await;
        let entry = LogEntry { index: state.last_index + 1, term: state.term, payload };
        let result = self.fsm.apply(&entry).await?;
        state.last_index = entry.index;
        state.entries.push(entry);
        Ok(result)
    }
}

impl<S: MeshStore> ConsensusLog for LocalLog<S> {
    async fn propose(&self, cmd: Command) -> Result<ApplyResult, SkeinError> {
        let payload = encode_command(&cmd, self.encoding)?;
        tracing::debug!(kind = cmd.kind(), bytes = payload.len(), "proposing command");
        self.append(LogPayload::Command(payload)).await
    }
}
