#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use mdmemory::db::{self, SharedConnection};
use mdmemory::memory::events::{EventSink, MutationEvent};
use mdmemory::memory::queue::{
    enqueue_memory_update, EnqueueInput, PendingQueue, UpdateKind,
};
use mdmemory::memory::SnapshotUpdater;
use mdmemory::storage::memory::InMemoryStorage;
use mdmemory::summarizer::types::{
    DigestItem, GeneratorError, SummarizeRequest, UpdateDigest, UpdateSummarizer,
};
use mdmemory::summarizer::UpdateRunner;
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

pub fn shared_test_db() -> SharedConnection {
    db::shared(test_db())
}

/// Enqueue a session update with a small payload. Returns the row id.
pub fn enqueue(conn: &Connection, user_id: &str, ref_id: &str) -> String {
    enqueue_memory_update(
        conn,
        &EnqueueInput {
            user_id: user_id.into(),
            kind: UpdateKind::Session,
            ref_id: ref_id.into(),
            payload: Some(serde_json::json!({ "note": format!("event {ref_id}") })),
            metadata: None,
        },
    )
    .unwrap()
    .id
}

/// Event sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MutationEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<MutationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn log_event(&self, event: &MutationEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Event sink that always fails.
pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn log_event(&self, _event: &MutationEvent) -> Result<()> {
        anyhow::bail!("event store unavailable")
    }
}

/// One scripted generator response.
pub enum Script {
    ModelFails(GeneratorError),
    Answer(Result<Option<UpdateDigest>, GeneratorError>),
    /// Summarize every pending item the request carries.
    EchoPending { digest: String },
}

/// Generator that replays scripted responses in order and records requests.
#[derive(Default)]
pub struct ScriptedSummarizer {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<SummarizeRequest>>,
}

impl ScriptedSummarizer {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SummarizeRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn front_model_error(&self) -> Option<GeneratorError> {
        let mut script = self.script.lock().unwrap();
        if matches!(script.front(), Some(Script::ModelFails(_))) {
            if let Some(Script::ModelFails(e)) = script.pop_front() {
                return Some(e);
            }
        }
        None
    }
}

#[async_trait]
impl UpdateSummarizer for ScriptedSummarizer {
    async fn resolve_model(&self) -> Result<String, GeneratorError> {
        match self.front_model_error() {
            Some(e) => Err(e),
            None => Ok("scripted-model".into()),
        }
    }

    async fn summarize(
        &self,
        _model: &str,
        request: &SummarizeRequest,
    ) -> Result<Option<UpdateDigest>, GeneratorError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Script::Answer(answer)) => answer,
            Some(Script::EchoPending { digest }) => Ok(Some(UpdateDigest {
                digest,
                items: request
                    .pending
                    .iter()
                    .map(|u| digest_item(&u.id, "summarized"))
                    .collect(),
                leftover_ids: Vec::new(),
            })),
            Some(Script::ModelFails(e)) => Err(e),
            None => Ok(None),
        }
    }
}

pub fn digest_item(id: &str, summary: &str) -> DigestItem {
    DigestItem {
        id: id.into(),
        kind: "session".into(),
        summary: summary.into(),
        follow_up: None,
    }
}

/// Wired runner over in-memory storage and a shared in-memory database.
pub struct Harness {
    pub db: SharedConnection,
    pub storage: Arc<InMemoryStorage>,
    pub events: Arc<RecordingSink>,
    pub updater: SnapshotUpdater,
    pub queue: PendingQueue,
    pub runner: UpdateRunner,
}

pub fn harness(summarizer: Option<Arc<dyn UpdateSummarizer>>) -> Harness {
    let db = shared_test_db();
    let storage = Arc::new(InMemoryStorage::new());
    let events = Arc::new(RecordingSink::default());
    let updater = SnapshotUpdater::new(storage.clone(), events.clone());
    let queue = PendingQueue::new(db.clone());
    let runner = UpdateRunner::new(queue.clone(), updater.clone(), summarizer, 25);
    Harness {
        db,
        storage,
        events,
        updater,
        queue,
        runner,
    }
}

impl Harness {
    pub fn enqueue(&self, user_id: &str, ref_id: &str) -> String {
        let conn = self.db.lock().unwrap();
        enqueue(&conn, user_id, ref_id)
    }

    pub fn pending_count(&self, user_id: &str) -> usize {
        let conn = self.db.lock().unwrap();
        mdmemory::memory::queue::fetch_pending_updates(&conn, user_id, 100)
            .unwrap()
            .len()
    }
}
