use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use super::transaction::{Transaction, TransactionControl};
use crate::config::DataSourceConfig;
use crate::dataobject::{DataObjectDescriptor, DataObjectKind};
use crate::error::{DataSourceError, InterpretationError};
use crate::interpreter::{DataObject, DataObjectCache, Interpreter};
use crate::marshal::{Marshaller, Prefix, SignatureCursor};
use crate::schema::TableSchema;
use crate::sql::{
    Connection, DatabaseManipulator, MemoryDatabase, MemoryManipulator, Predicate,
};
use crate::types::{
    DataArgumentWrapper, DataExtractorFactory, RegistryArgumentWrapper,
    RegistryExtractorFactory, TypeKey, TypeRegistry,
};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Connection plus the slot of the outstanding transaction.
struct SharedState<C> {
    connection: Mutex<C>,
    active: Mutex<Option<u64>>,
    released: Condvar,
}

impl<C: Connection> SharedState<C> {
    fn release(&self, id: u64) -> Result<(), DataSourceError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| DataSourceError::LockPoisoned)?;
        if *active == Some(id) {
            *active = None;
            self.released.notify_all();
        }
        Ok(())
    }
}

impl<C: Connection> TransactionControl for SharedState<C> {
    fn finish(&self, id: u64, commit: bool) -> Result<(), DataSourceError> {
        let result = match self.connection.lock() {
            Ok(mut connection) => {
                let outcome = if commit {
                    connection.commit().or_else(|e| {
                        tracing::warn!("Commit of transaction {} failed: {}", id, e);
                        connection.rollback()?;
                        Err(e)
                    })
                } else {
                    connection.rollback()
                };
                outcome.map_err(DataSourceError::from)
            }
            Err(_) => Err(DataSourceError::LockPoisoned),
        };
        self.release(id)?;
        result
    }
}

/// Maps one data object type family onto one table.
///
/// All operations are serialized through the single connection. Writes run
/// in a [`Transaction`]; at most one is outstanding at a time and any other
/// transactional call fails with [`DataSourceError::Busy`].
pub struct DataSource<M: DatabaseManipulator> {
    manipulator: M,
    config: DataSourceConfig,
    state: Arc<SharedState<M::Connection>>,
    cache: &'static DataObjectCache,
    interpreter: Interpreter,
    wrapper: Box<dyn DataArgumentWrapper>,
    extractors: Box<dyn DataExtractorFactory>,
}

/// Builder for [`DataSource`].
pub struct DataSourceBuilder<M: DatabaseManipulator> {
    manipulator: M,
    connection: M::Connection,
    config: DataSourceConfig,
    cache: &'static DataObjectCache,
    interpreter: Interpreter,
    wrapper: Option<Box<dyn DataArgumentWrapper>>,
    extractors: Option<Box<dyn DataExtractorFactory>>,
}

impl<M: DatabaseManipulator> DataSourceBuilder<M> {
    pub fn config(mut self, config: DataSourceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.config.table_name = table_name.into();
        self
    }

    pub fn cache(mut self, cache: &'static DataObjectCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Uses argument wrapper and extractors backed by `registry`.
    pub fn codecs(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.wrapper = Some(Box::new(RegistryArgumentWrapper::new(Arc::clone(&registry))));
        self.extractors = Some(Box::new(RegistryExtractorFactory::new(registry)));
        self
    }

    pub fn wrapper(mut self, wrapper: Box<dyn DataArgumentWrapper>) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    pub fn extractors(mut self, extractors: Box<dyn DataExtractorFactory>) -> Self {
        self.extractors = Some(extractors);
        self
    }

    /// Validates the configuration and disables auto-commit.
    pub fn build(self) -> Result<DataSource<M>, DataSourceError> {
        self.config.validate()?;
        let mut connection = self.connection;
        connection.set_auto_commit(false)?;

        let (wrapper, extractors) = match (self.wrapper, self.extractors) {
            (Some(wrapper), Some(extractors)) => (wrapper, extractors),
            (wrapper, extractors) => {
                let registry = Arc::new(TypeRegistry::with_builtin_types()?);
                let wrapper = wrapper.unwrap_or_else(|| {
                    Box::new(RegistryArgumentWrapper::new(Arc::clone(&registry)))
                        as Box<dyn DataArgumentWrapper>
                });
                let extractors = extractors.unwrap_or_else(|| {
                    Box::new(RegistryExtractorFactory::new(registry))
                        as Box<dyn DataExtractorFactory>
                });
                (wrapper, extractors)
            }
        };

        tracing::debug!("Data source for table {} ready", self.config.table_name);
        Ok(DataSource {
            manipulator: self.manipulator,
            config: self.config,
            state: Arc::new(SharedState {
                connection: Mutex::new(connection),
                active: Mutex::new(None),
                released: Condvar::new(),
            }),
            cache: self.cache,
            interpreter: self.interpreter,
            wrapper,
            extractors,
        })
    }
}

impl DataSource<MemoryManipulator> {
    /// Data source over an in-memory database with the built-in codecs.
    pub fn memory(
        database: &Arc<MemoryDatabase>,
        config: DataSourceConfig,
    ) -> Result<Self, DataSourceError> {
        let manipulator = MemoryManipulator::with_builtin_types()?;
        let registry = Arc::clone(manipulator.registry());
        DataSource::builder(manipulator, database.connect())
            .config(config)
            .codecs(registry)
            .build()
    }
}

impl<M: DatabaseManipulator> DataSource<M> {
    pub fn builder(manipulator: M, connection: M::Connection) -> DataSourceBuilder<M> {
        DataSourceBuilder {
            manipulator,
            connection,
            config: DataSourceConfig::default(),
            cache: DataObjectCache::global(),
            interpreter: Interpreter::new(),
            wrapper: None,
            extractors: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub fn manipulator(&self) -> &M {
        &self.manipulator
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Whether a transaction is outstanding.
    pub fn is_busy(&self) -> Result<bool, DataSourceError> {
        Ok(self.active()?.is_some())
    }

    /// Starts a transaction for subsequent write operations.
    pub fn begin(&self) -> Result<Transaction, DataSourceError> {
        let (transaction, _) = self.acquire(None)?;
        Ok(transaction)
    }

    /// Blocks until no transaction is outstanding.
    ///
    /// `None` falls back to the configured timeout, and waits forever when
    /// none is configured. Returns `false` on timeout.
    pub fn wait_for_transaction(
        &self,
        timeout: Option<Duration>,
    ) -> Result<bool, DataSourceError> {
        let active = self.active()?;
        match timeout.or_else(|| self.config.transaction_wait_timeout()) {
            None => {
                let _active = self
                    .state
                    .released
                    .wait_while(active, |active| active.is_some())
                    .map_err(|_| DataSourceError::LockPoisoned)?;
                Ok(true)
            }
            Some(timeout) => {
                let (active, _) = self
                    .state
                    .released
                    .wait_timeout_while(active, timeout, |active| active.is_some())
                    .map_err(|_| DataSourceError::LockPoisoned)?;
                Ok(active.is_none())
            }
        }
    }

    /// Reads the row matching the keys of `object` into its values.
    ///
    /// Returns `false`, leaving `object` untouched, when there is no such
    /// row. A failed pull leaves `object` partially populated.
    pub fn pull<T: DataObject>(&self, object: &mut T) -> Result<bool, DataSourceError> {
        self.pull_inner(object, None)
    }

    /// [`DataSource::pull`] with one signature shared by every container of
    /// the object, overriding their declared signatures.
    pub fn pull_with_signature<T: DataObject>(
        &self,
        object: &mut T,
        signature: &[TypeKey],
    ) -> Result<bool, DataSourceError> {
        self.pull_inner(object, Some(signature))
    }

    fn pull_inner<T: DataObject>(
        &self,
        object: &mut T,
        signature: Option<&[TypeKey]>,
    ) -> Result<bool, DataSourceError> {
        let descriptor = self.descriptor::<T>()?;
        let marshaller = self.marshaller();
        let keys = marshaller.key_columns(&*object, &descriptor, "pull", false)?;
        let columns: Vec<String> = marshaller
            .schema()
            .object_columns(&descriptor, &Prefix::empty(), false)?
            .into_iter()
            .map(|column| column.name)
            .collect();

        let mut connection = self.connection()?;
        let mut rows = self.manipulator.query(
            &mut *connection,
            self.table_name(),
            Some(keys.as_slice()),
            Some(columns.as_slice()),
        )?;
        if !rows.next()? {
            return Ok(false);
        }
        let mut shared = signature.map(SignatureCursor::new);
        marshaller.extract_object(
            &mut *connection,
            &*rows,
            object,
            &descriptor,
            false,
            shared.as_mut(),
        )?;
        Ok(true)
    }

    /// Every row of the table.
    pub fn pull_all<T: DataObject>(&self) -> Result<Vec<T>, DataSourceError> {
        self.pull_matching(None)
    }

    /// Rows matching the keys `pattern` has set. Absent keys match anything.
    pub fn pull_vaguely<T: DataObject>(&self, pattern: &T) -> Result<Vec<T>, DataSourceError> {
        let descriptor = self.descriptor::<T>()?;
        let keys = self
            .marshaller()
            .key_columns(pattern, &descriptor, "pull", true)?;
        self.pull_matching(Some(keys.as_slice()))
    }

    fn pull_matching<T: DataObject>(
        &self,
        keys: Option<Predicate<'_>>,
    ) -> Result<Vec<T>, DataSourceError> {
        let descriptor = self.descriptor::<T>()?;
        let marshaller = self.marshaller();
        let mut connection = self.connection()?;
        let mut rows = self
            .manipulator
            .query(&mut *connection, self.table_name(), keys, None)?;
        let mut objects = Vec::new();
        while rows.next()? {
            let mut object = T::default();
            marshaller.extract_object(
                &mut *connection,
                &*rows,
                &mut object,
                &descriptor,
                true,
                None,
            )?;
            objects.push(object);
        }
        tracing::trace!("Pulled {} rows from {}", objects.len(), self.table_name());
        Ok(objects)
    }

    /// Writes `object`, replacing the row with the same keys together with
    /// its synthetic collection tables.
    pub fn commit<T: DataObject>(
        &self,
        transaction: Option<&Transaction>,
        object: &T,
    ) -> Result<Transaction, DataSourceError> {
        self.commit_inner(transaction, object, None)
    }

    pub fn commit_with_signature<T: DataObject>(
        &self,
        transaction: Option<&Transaction>,
        object: &T,
        signature: &[TypeKey],
    ) -> Result<Transaction, DataSourceError> {
        self.commit_inner(transaction, object, Some(signature))
    }

    fn commit_inner<T: DataObject>(
        &self,
        transaction: Option<&Transaction>,
        object: &T,
        signature: Option<&[TypeKey]>,
    ) -> Result<Transaction, DataSourceError> {
        let descriptor = self.descriptor::<T>()?;
        let marshaller = self.marshaller();
        let keys = marshaller.key_columns(object, &descriptor, "commit", false)?;
        let mut shared = signature.map(SignatureCursor::new);
        let assembled = marshaller.assemble_object(object, &descriptor, shared.as_mut())?;

        let (transaction, ()) = self.transactional(transaction, |connection| {
            self.delete_rows(
                connection,
                &marshaller,
                &descriptor,
                Some(keys.as_slice()),
                signature,
            )?;
            for collection in &assembled.collections {
                let schema = &collection.schema;
                self.manipulator
                    .drop_table_if_exists(connection, &schema.table)?;
                self.manipulator.create_table(
                    connection,
                    &schema.table,
                    &schema.columns,
                    &schema.constraints,
                )?;
                for row in &collection.rows {
                    self.manipulator.insert(connection, &schema.table, row)?;
                }
            }
            self.manipulator
                .insert(connection, self.table_name(), &assembled.columns)?;
            Ok(())
        })?;
        Ok(transaction)
    }

    /// Deletes the row with the keys of `object`.
    pub fn remove<T: DataObject>(
        &self,
        transaction: Option<&Transaction>,
        object: &T,
    ) -> Result<Transaction, DataSourceError> {
        self.remove_matching(transaction, object, false)
    }

    /// Deletes every row matching the keys `pattern` has set.
    pub fn remove_vaguely<T: DataObject>(
        &self,
        transaction: Option<&Transaction>,
        pattern: &T,
    ) -> Result<Transaction, DataSourceError> {
        self.remove_matching(transaction, pattern, true)
    }

    fn remove_matching<T: DataObject>(
        &self,
        transaction: Option<&Transaction>,
        object: &T,
        vague: bool,
    ) -> Result<Transaction, DataSourceError> {
        let descriptor = self.descriptor::<T>()?;
        let marshaller = self.marshaller();
        let keys = marshaller.key_columns(object, &descriptor, "remove", vague)?;
        let (transaction, removed) = self.transactional(transaction, |connection| {
            self.delete_rows(connection, &marshaller, &descriptor, Some(keys.as_slice()), None)
        })?;
        tracing::trace!("Removed {} rows from {}", removed, self.table_name());
        Ok(transaction)
    }

    /// Deletes every row of the table.
    pub fn clear<T: DataObject>(
        &self,
        transaction: Option<&Transaction>,
    ) -> Result<Transaction, DataSourceError> {
        let descriptor = self.descriptor::<T>()?;
        let marshaller = self.marshaller();
        let (transaction, _) = self.transactional(transaction, |connection| {
            self.delete_rows(connection, &marshaller, &descriptor, None, None)
        })?;
        Ok(transaction)
    }

    pub fn table_schema<T: DataObject>(&self) -> Result<TableSchema, DataSourceError> {
        let descriptor = self.descriptor::<T>()?;
        self.marshaller()
            .schema()
            .generate(self.table_name(), &descriptor)
    }

    pub fn create_table<T: DataObject>(&self) -> Result<(), DataSourceError> {
        let schema = self.table_schema::<T>()?;
        tracing::debug!("Creating table {}", schema.table);
        self.definition(|connection| {
            self.manipulator.create_table(
                connection,
                &schema.table,
                &schema.columns,
                &schema.constraints,
            )?;
            Ok(())
        })
    }

    /// Returns `false` when the table already existed.
    pub fn create_table_if_not_exists<T: DataObject>(&self) -> Result<bool, DataSourceError> {
        let schema = self.table_schema::<T>()?;
        self.definition(|connection| {
            let created = self.manipulator.create_table_if_not_exists(
                connection,
                &schema.table,
                &schema.columns,
                &schema.constraints,
            )?;
            if created {
                tracing::debug!("Created table {}", schema.table);
            }
            Ok(created)
        })
    }

    /// Runs DDL as its own committed unit of work.
    fn definition<R>(
        &self,
        work: impl FnOnce(&mut M::Connection) -> Result<R, DataSourceError>,
    ) -> Result<R, DataSourceError> {
        let (transaction, result) = self.transactional(None, work)?;
        transaction.push()?;
        Ok(result)
    }

    /// Drops the synthetic tables of the matching rows, then the rows.
    fn delete_rows(
        &self,
        connection: &mut M::Connection,
        marshaller: &Marshaller<'_, M>,
        descriptor: &DataObjectDescriptor,
        keys: Option<Predicate<'_>>,
        signature: Option<&[TypeKey]>,
    ) -> Result<usize, DataSourceError> {
        let mut rows = self
            .manipulator
            .query(connection, self.table_name(), keys, None)?;
        let mut stale = Vec::new();
        while rows.next()? {
            let mut shared = signature.map(SignatureCursor::new);
            stale.extend(marshaller.collection_tables(
                connection,
                &*rows,
                descriptor,
                shared.as_mut(),
            )?);
        }
        for table in &stale {
            self.manipulator.drop_table_if_exists(connection, table)?;
        }
        Ok(self.manipulator.delete(connection, self.table_name(), keys)?)
    }

    /// Runs `work` in `transaction`, or in a new transaction that is
    /// cancelled again if `work` fails.
    fn transactional<R>(
        &self,
        transaction: Option<&Transaction>,
        work: impl FnOnce(&mut M::Connection) -> Result<R, DataSourceError>,
    ) -> Result<(Transaction, R), DataSourceError> {
        let (transaction, created) = self.acquire(transaction)?;
        let result = self
            .connection()
            .and_then(|mut connection| work(&mut *connection));
        match result {
            Ok(result) => Ok((transaction, result)),
            Err(e) => {
                if created {
                    tracing::debug!(
                        "Cancelling transaction {} after failure: {}",
                        transaction.id(),
                        e
                    );
                    transaction.cancel();
                }
                Err(e)
            }
        }
    }

    /// The outstanding transaction if `transaction` is it, otherwise a new
    /// one when none is outstanding. The flag tells whether it is new.
    fn acquire(
        &self,
        transaction: Option<&Transaction>,
    ) -> Result<(Transaction, bool), DataSourceError> {
        let mut active = self.active()?;
        match (transaction, *active) {
            (Some(transaction), Some(id)) if transaction.id() == id && transaction.is_valid() => {
                Ok((transaction.clone(), false))
            }
            (None, None) => {
                let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
                *active = Some(id);
                let control: Arc<dyn TransactionControl> = self.state.clone();
                Ok((Transaction::new(id, control), true))
            }
            _ => Err(DataSourceError::Busy),
        }
    }

    fn active(&self) -> Result<MutexGuard<'_, Option<u64>>, DataSourceError> {
        self.state
            .active
            .lock()
            .map_err(|_| DataSourceError::LockPoisoned)
    }

    fn connection(&self) -> Result<MutexGuard<'_, M::Connection>, DataSourceError> {
        self.state
            .connection
            .lock()
            .map_err(|_| DataSourceError::LockPoisoned)
    }

    fn marshaller(&self) -> Marshaller<'_, M> {
        Marshaller::new(
            &self.manipulator,
            self.table_name(),
            self.cache,
            &self.interpreter,
            &*self.wrapper,
            &*self.extractors,
        )
    }

    /// Descriptor of a keyed data object type.
    fn descriptor<T: DataObject>(&self) -> Result<Arc<DataObjectDescriptor>, DataSourceError> {
        let descriptor = self
            .cache
            .interpret_if_absent(&TypeKey::data_object::<T>(), &self.interpreter)?;
        if descriptor.kind() == DataObjectKind::Element {
            return Err(InterpretationError::WrongShape {
                type_name: std::any::type_name::<T>().to_string(),
                expected: "unique or multiple",
            }
            .into());
        }
        Ok(descriptor)
    }
}
