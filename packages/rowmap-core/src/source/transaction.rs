use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::DataSourceError;

/// Ends the unit of work behind a transaction.
pub(crate) trait TransactionControl: Send + Sync {
    /// Commits or rolls back, then releases the data source.
    fn finish(&self, id: u64, commit: bool) -> Result<(), DataSourceError>;
}

struct Inner {
    id: u64,
    valid: AtomicBool,
    last_error: Mutex<Option<DataSourceError>>,
    control: Arc<dyn TransactionControl>,
}

impl Inner {
    /// Returns whether this call invalidated the transaction.
    fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }

    fn record(&self, error: DataSourceError) {
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = Some(error);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if *self.valid.get_mut() {
            tracing::warn!("Transaction {} dropped while active, rolling back", self.id);
            if let Err(e) = self.control.finish(self.id, false) {
                tracing::warn!("Rollback of transaction {} failed: {}", self.id, e);
            }
        }
    }
}

/// Handle to the outstanding unit of work of a data source.
///
/// Clones share one transaction and compare equal. Once pushed or
/// cancelled the handle is invalid and both operations become no-ops.
/// Dropping the last handle of a valid transaction rolls it back.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

impl Transaction {
    pub(crate) fn new(id: u64, control: Arc<dyn TransactionControl>) -> Self {
        tracing::debug!("Transaction {} started", id);
        Self {
            inner: Arc::new(Inner {
                id,
                valid: AtomicBool::new(true),
                last_error: Mutex::new(None),
                control,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    /// Commits the unit of work.
    ///
    /// A failed commit is rolled back; the handle is invalid either way.
    pub fn push(&self) -> Result<(), DataSourceError> {
        if !self.inner.invalidate() {
            return Ok(());
        }
        tracing::debug!("Committing transaction {}", self.inner.id);
        self.inner.control.finish(self.inner.id, true).map_err(|e| {
            self.inner.record(e.clone());
            e
        })
    }

    /// Rolls the unit of work back.
    ///
    /// Never fails: a rollback failure is recorded and available from
    /// [`Transaction::last_error`].
    pub fn cancel(&self) {
        if !self.inner.invalidate() {
            return;
        }
        tracing::debug!("Rolling back transaction {}", self.inner.id);
        if let Err(e) = self.inner.control.finish(self.inner.id, false) {
            tracing::warn!("Rollback of transaction {} failed: {}", self.inner.id, e);
            self.inner.record(e);
        }
    }

    /// Failure recorded by the last `push` or `cancel`.
    pub fn last_error(&self) -> Option<DataSourceError> {
        self.inner
            .last_error
            .lock()
            .ok()
            .and_then(|last_error| last_error.clone())
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("valid", &self.is_valid())
            .finish()
    }
}
