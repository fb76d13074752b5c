//! In-memory gateway for offline use and tests
//!
//! MemoryGateway implements `TableGateway`, `ObjectStorage` and `ChangeNotifications`:
//! - Tables are JSON rows keyed by an auto-incremented id
//! - Every write broadcasts a `ChangeEvent`, shaped like the hosted service's
//!   (deletes and updates only carry the id in `old`)
//! - Operations can be made to fail on demand, and every call is counted

use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::debug;

use barkeep_api::streaming::EventStream;
use barkeep_api::{
    ApiError, ChangeEvent, ChangeKind, ChangeNotifications, ID_COLUMN, ObjectRef, Query, Row,
    RowId, Subscription,
};
use barkeep_core::{ObjectStorage, Result, TableGateway};

/// Gateway operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Query,
    Insert,
    Update,
    Delete,
    Upload,
    Subscribe,
}

#[derive(Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, Row>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    objects: HashMap<(String, String), Vec<u8>>,
    failing: HashSet<GatewayOp>,
}

pub struct MemoryGateway {
    state: Mutex<State>,
    change_tx: broadcast::Sender<ChangeEvent>,
    calls: AtomicUsize,
    subscribers: Arc<AtomicUsize>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(1000);
        Self {
            state: Mutex::new(State::default()),
            change_tx,
            calls: AtomicUsize::new(0),
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Insert rows directly, without counting calls. Returns the stored rows.
    pub fn seed(&self, table: &str, rows: Vec<Row>) -> Vec<Row> {
        let mut state = self.lock();
        rows.into_iter()
            .map(|row| self.insert_locked(&mut state, table, row))
            .collect()
    }

    /// Current rows of `table`, in id order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), name.to_string()))
            .cloned()
    }

    /// Make `op` fail until [`recover`](Self::recover) is called.
    pub fn fail_on(&self, op: GatewayOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: GatewayOp) {
        self.lock().failing.remove(&op);
    }

    /// Number of gateway calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of subscriptions not yet released
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// Push an event to subscribers as if another client had written it.
    pub fn emit(&self, event: ChangeEvent) {
        // Ignore errors if no receivers
        let _ = self.change_tx.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and fail it if requested.
    fn begin(&self, state: &State, op: GatewayOp) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if state.failing.contains(&op) {
            debug!("[MemoryGateway] failing {:?}", op);
            return Err(ApiError::NetworkError {
                message: format!("{:?} failed (injected)", op),
            });
        }
        Ok(())
    }

    fn insert_locked(&self, state: &mut State, table: &str, mut row: Row) -> Row {
        let entry = state.tables.entry(table.to_string()).or_default();
        entry.last_id += 1;
        let id = entry.last_id;
        row.insert(ID_COLUMN.to_string(), serde_json::Value::from(id));
        entry.rows.insert(id, row.clone());

        self.emit(ChangeEvent {
            kind: ChangeKind::Insert,
            table: table.to_string(),
            new: Some(row.clone()),
            old: None,
        });
        row
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn id_only(id: RowId) -> Row {
    let mut row = Row::new();
    row.insert(ID_COLUMN.to_string(), serde_json::Value::from(id.0));
    row
}

fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> CmpOrdering {
    use serde_json::Value;
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        // nulls last, like an ascending Postgres sort
        (None | Some(Value::Null), None | Some(Value::Null)) => CmpOrdering::Equal,
        (None | Some(Value::Null), _) => CmpOrdering::Greater,
        (_, None | Some(Value::Null)) => CmpOrdering::Less,
        _ => CmpOrdering::Equal,
    }
}

#[async_trait]
impl TableGateway for MemoryGateway {
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let state = self.lock();
        self.begin(&state, GatewayOp::Query)?;

        let mut rows: Vec<Row> = state
            .tables
            .get(table)
            .map(|t| {
                t.rows
                    .values()
                    .filter(|row| {
                        query
                            .filters
                            .iter()
                            .all(|f| row.get(&f.column) == Some(&f.value))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let mut state = self.lock();
        self.begin(&state, GatewayOp::Insert)?;
        Ok(self.insert_locked(&mut state, table, row))
    }

    async fn update(&self, table: &str, id: RowId, patch: Row) -> Result<()> {
        let mut state = self.lock();
        self.begin(&state, GatewayOp::Update)?;

        let row = state
            .tables
            .get_mut(table)
            .and_then(|t| t.rows.get_mut(&id.0))
            .ok_or_else(|| ApiError::RowNotFound {
                table: table.to_string(),
                id,
            })?;
        for (column, value) in patch {
            if column != ID_COLUMN {
                row.insert(column, value);
            }
        }
        let new = row.clone();

        self.emit(ChangeEvent {
            kind: ChangeKind::Update,
            table: table.to_string(),
            new: Some(new),
            old: Some(id_only(id)),
        });
        Ok(())
    }

    async fn delete(&self, table: &str, id: RowId) -> Result<()> {
        let mut state = self.lock();
        self.begin(&state, GatewayOp::Delete)?;

        let removed = state
            .tables
            .get_mut(table)
            .and_then(|t| t.rows.remove(&id.0));
        // Deleting a missing row succeeds without an event, like a filtered DELETE
        if removed.is_some() {
            self.emit(ChangeEvent {
                kind: ChangeKind::Delete,
                table: table.to_string(),
                new: None,
                old: Some(id_only(id)),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryGateway {
    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<ObjectRef> {
        let mut state = self.lock();
        self.begin(&state, GatewayOp::Upload)?;
        state
            .objects
            .insert((bucket.to_string(), name.to_string()), bytes);
        Ok(ObjectRef {
            bucket: bucket.to_string(),
            name: name.to_string(),
        })
    }

    fn public_url(&self, bucket: &str, name: &str) -> Result<String> {
        Ok(format!("memory://{}/{}", bucket, name))
    }
}

#[async_trait]
impl ChangeNotifications for MemoryGateway {
    async fn subscribe(
        &self,
        table: &str,
        kinds: &[ChangeKind],
    ) -> std::result::Result<Subscription, ApiError> {
        {
            let state = self.lock();
            self.begin(&state, GatewayOp::Subscribe)?;
        }

        let rx = self.change_tx.subscribe();
        let wanted_table = table.to_string();
        let kinds = kinds.to_vec();

        let events = futures::stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((Ok(event), rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => Some((
                    Err(ApiError::SubscriptionError {
                        message: format!("Stream lagged by {} messages", n),
                    }),
                    rx,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        })
        .filter(move |item| match item {
            Ok(event) => event.table == wanted_table && kinds.contains(&event.kind),
            Err(_) => true,
        });
        let events: EventStream = Box::pin(events);

        self.subscribers.fetch_add(1, Ordering::SeqCst);
        let subscribers = Arc::clone(&self.subscribers);
        Ok(Subscription::new(table, events).on_release(move || {
            subscribers.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}
