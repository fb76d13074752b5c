//! ViewModel: a live, locally held copy of one view of a table
//!
//! A ViewModel wraps a `Gateway` and provides:
//! - the current rows of its view, as a snapshot or a `watch` receiver
//! - create/remove/set_status operations that call the gateway, apply the result
//!   locally and report the outcome through a `Notifier`
//! - a background task applying the table's change stream to the same rows
//!
//! Architecture:
//! - user action → gateway call → result reconciled locally → echo on the change
//!   stream reconciled again (no-op)
//! - write by another client → change stream → reconciled
//! - fetch → snapshot replaces the rows, then every change seen while the fetch was
//!   in flight is replayed on top of it
//! - a limited view that drops below its limit after being full is fetched again

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use barkeep_api::{ApiError, Change, ChangeKind, ChangeOrigin, RowId, Subscription};
use barkeep_core::{Draft, Entity, Gateway, HasStatus, ImageAttachment, ValidationError};

use crate::core::notification::Notifier;
use crate::core::reconcile::reconcile;
use crate::core::view::View;

/// Bucket receiving draft images unless configured otherwise.
pub const IMAGES_BUCKET: &str = "images";

/// Fetches per refresh when changes keep emptying slots of a limited view
const MAX_FETCHES: usize = 3;

/// Why a view-model operation did not go through.
///
/// The matching notification has already been emitted when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum ViewModelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message} ({source})")]
    Gateway {
        message: String,
        #[source]
        source: ApiError,
    },
}

impl ViewModelError {
    /// Message shown to the user
    pub fn message(&self) -> &str {
        match self {
            ViewModelError::Validation(e) => e.message(),
            ViewModelError::Gateway { message, .. } => message,
        }
    }
}

/// Rows of a view shared between the view-model and its listener.
struct Shared<E: Entity> {
    rows: watch::Sender<Vec<E>>,
    // Some while a fetch is in flight: changes applied meanwhile, in order
    pending: Mutex<Option<Vec<Change<E>>>>,
    fetching: tokio::sync::Mutex<()>,
}

impl<E: Entity> Shared<E> {
    fn new() -> Self {
        let (rows, _) = watch::channel(Vec::new());
        Self {
            rows,
            pending: Mutex::new(None),
            fetching: tokio::sync::Mutex::new(()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<Vec<Change<E>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one change. Returns true when a full limited view lost a row and
    /// must be fetched again to fill the gap.
    fn apply(&self, view: &View<E>, change: Change<E>) -> bool {
        let mut pending = self.pending();
        if let Some(buffer) = pending.as_mut() {
            buffer.push(change.clone());
        }

        let kind = change.kind();
        let origin = change.origin();
        let mut shrunk = false;
        let modified = self.rows.send_if_modified(|rows| {
            let before = rows.len();
            let modified = reconcile(rows, view, change);
            shrunk = is_short(view, before, rows.len());
            modified
        });
        debug!(
            "[ViewModel] {:?} {} on {}: {}",
            origin,
            kind,
            view.name(),
            if modified { "applied" } else { "no-op" }
        );
        // An in-flight fetch checks the gap itself once it settles
        shrunk && pending.is_none()
    }

    fn begin_fetch(&self) {
        *self.pending() = Some(Vec::new());
    }

    /// Install a fetched snapshot and replay what happened while it was in flight.
    ///
    /// Returns the row count and whether the replay left a full view short.
    fn settle(&self, view: &View<E>, fetched: Result<Vec<E>, ApiError>) -> Result<(usize, bool), ApiError> {
        let mut pending = self.pending();
        let buffered = pending.take().unwrap_or_default();
        // On failure the buffered changes are already in the rows
        let fetched = fetched?;

        let full = view.limit().is_some_and(|limit| fetched.len() >= limit);
        let mut settled = (0, false);
        self.rows.send_modify(|rows| {
            *rows = fetched;
            let replayed = buffered.len();
            for change in buffered {
                reconcile(rows, view, change);
            }
            if replayed > 0 {
                debug!("[ViewModel] replayed {} changes onto {}", replayed, view.name());
            }
            settled = (rows.len(), full && view.limit().is_some_and(|limit| rows.len() < limit));
        });
        Ok(settled)
    }
}

fn is_short<E: Entity>(view: &View<E>, before: usize, after: usize) -> bool {
    view.limit().is_some_and(|limit| before >= limit && after < limit)
}

/// Fetch the view's rows without losing changes that arrive meanwhile.
async fn load<E: Entity>(gateway: &dyn Gateway, shared: &Shared<E>, view: &View<E>) -> Result<usize, ApiError> {
    let _fetching = shared.fetching.lock().await;
    let mut count = 0;
    for _ in 0..MAX_FETCHES {
        shared.begin_fetch();
        let fetched = gateway
            .query(E::TABLE, view.query())
            .await
            .and_then(|rows| rows.into_iter().map(E::from_row).collect::<Result<Vec<_>, _>>());
        let (rows, short) = shared.settle(view, fetched)?;
        count = rows;
        if !short {
            break;
        }
        debug!("[ViewModel] {} lost rows while fetching, fetching again", view.name());
    }
    Ok(count)
}

pub struct ViewModel<E: Entity> {
    gateway: Arc<dyn Gateway>,
    view: View<E>,
    shared: Arc<Shared<E>>,
    notifier: Notifier,
    images_bucket: String,
    listener: Option<JoinHandle<()>>,
}

impl<E: Entity> ViewModel<E> {
    /// Create an empty view-model. Nothing is fetched until [`refresh`](Self::refresh)
    /// and no events arrive until [`listen`](Self::listen).
    pub fn new(gateway: Arc<dyn Gateway>, view: View<E>, notifier: Notifier) -> Self {
        Self {
            gateway,
            view,
            shared: Arc::new(Shared::new()),
            notifier,
            images_bucket: IMAGES_BUCKET.to_string(),
            listener: None,
        }
    }

    pub fn with_images_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.images_bucket = bucket.into();
        self
    }

    /// Subscribe to the table's changes, then load the view.
    ///
    /// Changes arriving while the initial fetch is in flight are replayed onto its
    /// result, so writes made between the two are kept. Failures are reported
    /// through the notifier and leave the view-model usable.
    pub async fn open(gateway: Arc<dyn Gateway>, view: View<E>, notifier: Notifier) -> Self {
        let mut view_model = Self::new(gateway, view, notifier);
        let _ = view_model.listen().await;
        let _ = view_model.refresh().await;
        view_model
    }

    pub fn view(&self) -> &View<E> {
        &self.view
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Snapshot of the current rows
    pub fn rows(&self) -> Vec<E> {
        self.shared.rows.borrow().clone()
    }

    /// Receiver woken whenever the rows change
    pub fn watch(&self) -> watch::Receiver<Vec<E>> {
        self.shared.rows.subscribe()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| !l.is_finished())
    }

    /// Replace the rows with what the backend currently holds for the view.
    pub async fn refresh(&self) -> Result<(), ViewModelError> {
        debug!("[ViewModel] refreshing {}", self.view.name());
        let count = load(self.gateway.as_ref(), &self.shared, &self.view)
            .await
            .map_err(|e| self.gateway_failure(format!("Failed to fetch {}.", E::PLURAL), e))?;

        info!("[ViewModel] loaded {} rows into {}", count, self.view.name());
        Ok(())
    }

    /// Start applying the table's change stream. Does nothing if already listening.
    pub async fn listen(&mut self) -> Result<(), ViewModelError> {
        if self.is_listening() {
            return Ok(());
        }
        let subscription = self
            .gateway
            .subscribe(E::TABLE, &ChangeKind::ALL)
            .await
            .map_err(|e| self.gateway_failure(format!("Failed to subscribe to {}.", E::PLURAL), e))?;

        info!(
            "[ViewModel] {} listening on {} ({})",
            self.view.name(),
            E::TABLE,
            subscription.id()
        );
        self.listener = Some(spawn_listener(
            subscription,
            Arc::clone(&self.gateway),
            Arc::clone(&self.shared),
            self.view.clone(),
            self.notifier.clone(),
        ));
        Ok(())
    }

    /// Validate the draft, upload its image if any, insert the row and reset the draft.
    pub async fn create(&self, draft: &mut E::Draft) -> Result<E, ViewModelError> {
        if let Err(e) = draft.validate() {
            return Err(self.invalid(e));
        }

        let image_url = match draft.image() {
            Some(image) => Some(self.upload(image).await?),
            None => None,
        };
        let row = draft.to_row(image_url).map_err(|e| self.invalid(e))?;

        let created = self
            .gateway
            .insert(E::TABLE, row)
            .await
            .and_then(E::from_row)
            .map_err(|e| self.gateway_failure(format!("Failed to add {}.", E::LABEL), e))?;

        self.apply(Change::Created {
            data: created.clone(),
            origin: ChangeOrigin::Local,
        });
        *draft = E::Draft::default();
        self.notifier
            .success(format!("{} added successfully!", E::TITLE));
        Ok(created)
    }

    pub async fn remove(&self, id: RowId) -> Result<(), ViewModelError> {
        self.gateway
            .delete(E::TABLE, id)
            .await
            .map_err(|e| self.gateway_failure(format!("Failed to delete {}.", E::LABEL), e))?;

        let short = self.apply(Change::Deleted {
            id,
            origin: ChangeOrigin::Local,
        });
        self.notifier
            .success(format!("{} deleted successfully!", E::TITLE));
        if short {
            // A failed refill has been reported, the delete itself went through
            let _ = self.refresh().await;
        }
        Ok(())
    }

    /// Stop the change listener and release its subscription.
    ///
    /// Once this returns no further events are applied.
    pub async fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            // Resolves once the task, and with it the subscription, is dropped
            let _ = listener.await;
            info!("[ViewModel] {} closed", self.view.name());
        }
    }

    async fn upload(&self, image: &ImageAttachment) -> Result<String, ViewModelError> {
        let name = image.object_name(Utc::now().timestamp_millis());
        let object = self
            .gateway
            .upload_object(
                &self.images_bucket,
                &name,
                image.bytes.clone(),
                image.content_type.as_deref(),
            )
            .await
            .map_err(|e| self.gateway_failure("Failed to upload image.".to_string(), e))?;

        self.gateway
            .public_url(&object.bucket, &object.name)
            .map_err(|e| self.gateway_failure("Failed to generate public URL.".to_string(), e))
    }

    fn apply(&self, change: Change<E>) -> bool {
        self.shared.apply(&self.view, change)
    }

    fn invalid(&self, e: ValidationError) -> ViewModelError {
        debug!("[ViewModel] {} rejected input: {}", self.view.name(), e);
        self.notifier.error(e.message());
        ViewModelError::Validation(e)
    }

    fn gateway_failure(&self, message: String, source: ApiError) -> ViewModelError {
        error!("[ViewModel] {}: {}", message, source);
        self.notifier.error(message.clone());
        ViewModelError::Gateway { message, source }
    }
}

impl<E: HasStatus> ViewModel<E> {
    /// Change a row's status. The local row, if shown, is replaced with the merged record.
    pub async fn set_status(&self, id: RowId, status: E::Status) -> Result<(), ViewModelError> {
        if let Err(e) = E::validate_status(&status) {
            return Err(self.invalid(e));
        }

        self.gateway
            .update(E::TABLE, id, E::status_patch(&status))
            .await
            .map_err(|e| self.gateway_failure(E::STATUS_FAILURE.to_string(), e))?;

        let current = self.shared.rows.borrow().iter().find(|r| r.id() == id).cloned();
        let short = current.is_some_and(|current| {
            self.apply(Change::Updated {
                id,
                data: current.with_status(status.clone()),
                origin: ChangeOrigin::Local,
            })
        });
        self.notifier.success(E::status_message(&status));
        if short {
            let _ = self.refresh().await;
        }
        Ok(())
    }
}

impl<E: Entity> Drop for ViewModel<E> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn spawn_listener<E: Entity>(
    mut subscription: Subscription,
    gateway: Arc<dyn Gateway>,
    shared: Arc<Shared<E>>,
    view: View<E>,
    notifier: Notifier,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = subscription.next().await {
            match result {
                Ok(event) => match Change::from_event(event, E::from_row) {
                    Ok(change) => {
                        if shared.apply(&view, change) {
                            debug!("[ViewModel] refilling {}", view.name());
                            if let Err(e) = load(gateway.as_ref(), &shared, &view).await {
                                error!("[ViewModel] refilling {} failed: {}", view.name(), e);
                                notifier.error(format!("Failed to fetch {}.", E::PLURAL));
                            }
                        }
                    }
                    Err(e) => {
                        warn!("[ViewModel] skipping change on {}: {}", view.name(), e);
                    }
                },
                Err(e) => {
                    // Keep going, the next event may be fine
                    error!("[ViewModel] error in change stream for {}: {}", view.name(), e);
                }
            }
        }
        info!("[ViewModel] change stream for {} ended", view.name());
    })
}
