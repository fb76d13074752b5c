use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::{ApiError, Row, RowId};

/// Kind of row change reported by a table's change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change event as delivered by a gateway, before it is parsed into a typed record.
///
/// `new` is present for inserts and updates, `old` for updates and deletes. Hosted
/// backends usually only put the primary key into `old`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    pub new: Option<Row>,
    pub old: Option<Row>,
}

/// Origin of a change applied to a local collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOrigin {
    /// Result of a call made by this client
    Local,
    /// Pushed by the change stream
    Remote,
}

/// Typed change notification.
///
/// Produced either from a successful local call or from a [`ChangeEvent`] parsed at
/// the gateway boundary, so both paths can be applied by the same function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change<T> {
    /// Row was inserted
    Created { data: T, origin: ChangeOrigin },
    /// Row was updated; `data` is the full new row
    Updated {
        id: RowId,
        data: T,
        origin: ChangeOrigin,
    },
    /// Row was deleted
    Deleted { id: RowId, origin: ChangeOrigin },
}

impl<T> Change<T> {
    /// Parse a raw event, turning rows into `T` with `parse`.
    pub fn from_event<F>(event: ChangeEvent, parse: F) -> Result<Self, ApiError>
    where
        F: Fn(Row) -> Result<T, ApiError>,
    {
        let origin = ChangeOrigin::Remote;
        let missing = |which: &str| ApiError::MalformedEvent {
            table: event.table.clone(),
            message: format!("{} event without `{}` row", event.kind, which),
        };

        match event.kind {
            ChangeKind::Insert => {
                let new = event.new.clone().ok_or_else(|| missing("new"))?;
                Ok(Change::Created {
                    data: parse(new)?,
                    origin,
                })
            }
            ChangeKind::Update => {
                let new = event.new.clone().ok_or_else(|| missing("new"))?;
                let id = RowId::from_row(&event.table, &new)?;
                Ok(Change::Updated {
                    id,
                    data: parse(new)?,
                    origin,
                })
            }
            ChangeKind::Delete => {
                let old = event.old.as_ref().ok_or_else(|| missing("old"))?;
                let id = RowId::from_row(&event.table, old)?;
                Ok(Change::Deleted { id, origin })
            }
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Created { .. } => ChangeKind::Insert,
            Change::Updated { .. } => ChangeKind::Update,
            Change::Deleted { .. } => ChangeKind::Delete,
        }
    }

    pub fn origin(&self) -> ChangeOrigin {
        match self {
            Change::Created { origin, .. }
            | Change::Updated { origin, .. }
            | Change::Deleted { origin, .. } => *origin,
        }
    }
}

/// Identifier of a live subscription, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SubscriptionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ChangeEvent, ApiError>> + Send>>;

/// Handle to a table's change stream.
///
/// Yields events until the gateway closes the stream. Releasing the handle, either
/// through [`Subscription::unsubscribe`] or by dropping it, runs the gateway's release
/// hook exactly once so no further events are delivered.
pub struct Subscription {
    id: SubscriptionId,
    table: String,
    events: EventStream,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(table: &str, events: EventStream) -> Self {
        Self {
            id: SubscriptionId::next(),
            table: table.to_string(),
            events,
            release: None,
        }
    }

    /// Attach a hook that runs when the handle is released.
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::debug!("[Subscription] releasing {} on {}", self.id, self.table);
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("released", &self.release.is_none())
            .finish()
    }
}

impl Stream for Subscription {
    type Item = Result<ChangeEvent, ApiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}

/// Realtime change notification for a single table.
///
/// Events for one table arrive in the order the backend observed the writes. No
/// other ordering is promised, so consumers must apply them idempotently.
#[async_trait]
pub trait ChangeNotifications: Send + Sync {
    /// Subscribe to the given kinds of changes on `table`.
    async fn subscribe(&self, table: &str, kinds: &[ChangeKind])
        -> Result<Subscription, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio_stream::StreamExt;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn parse_name(row: Row) -> Result<String, ApiError> {
        row.get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ApiError::MalformedRow {
                table: "t".into(),
                message: "no name".into(),
            })
    }

    #[test]
    fn insert_event_becomes_created() {
        let event = ChangeEvent {
            kind: ChangeKind::Insert,
            table: "drinks".into(),
            new: Some(row(json!({"id": 1, "name": "Negroni"}))),
            old: None,
        };
        let change = Change::from_event(event, parse_name).unwrap();
        assert_eq!(
            change,
            Change::Created {
                data: "Negroni".to_string(),
                origin: ChangeOrigin::Remote
            }
        );
    }

    #[test]
    fn delete_event_only_needs_the_old_id() {
        let event = ChangeEvent {
            kind: ChangeKind::Delete,
            table: "drinks".into(),
            new: None,
            old: Some(row(json!({"id": 9}))),
        };
        let change = Change::<String>::from_event(event, parse_name).unwrap();
        assert_eq!(
            change,
            Change::Deleted {
                id: RowId(9),
                origin: ChangeOrigin::Remote
            }
        );
    }

    #[test]
    fn update_event_without_new_row_is_malformed() {
        let event = ChangeEvent {
            kind: ChangeKind::Update,
            table: "orders".into(),
            new: None,
            old: Some(row(json!({"id": 3}))),
        };
        let err = Change::<String>::from_event(event, parse_name).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEvent { .. }));
    }

    #[test]
    fn change_kind_uses_wire_names() {
        assert_eq!(serde_json::to_string(&ChangeKind::Update).unwrap(), "\"UPDATE\"");
        assert_eq!(ChangeKind::Delete.to_string(), "DELETE");
    }

    #[tokio::test]
    async fn subscription_releases_once_and_forwards_events() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let event = ChangeEvent {
            kind: ChangeKind::Insert,
            table: "drinks".into(),
            new: Some(row(json!({"id": 1}))),
            old: None,
        };
        let events: EventStream = Box::pin(tokio_stream::iter(vec![Ok(event.clone())]));
        let mut subscription = Subscription::new("drinks", events).on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(subscription.next().await, Some(Ok(event)));
        assert_eq!(subscription.next().await, None);

        subscription.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_a_subscription_releases_it() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let events: EventStream = Box::pin(tokio_stream::empty());
        let subscription = Subscription::new("orders", events).on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(subscription);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
