//! The public operation surface.

use crate::cache::CollectionCache;
use crate::config::{Config, EncryptionMode};
use crate::error::CoreResult;
use crate::pipeline::MutationPipeline;
use crate::query::{
    project, run_find_many, CountArgs, CreateArgs, CreateManyArgs, DeleteArgs, DeleteManyArgs,
    FindFirstArgs, FindManyArgs, FindUniqueArgs, UpdateArgs, UpdateManyArgs, UpsertArgs,
};
use crate::schema::SchemaDefinition;
use crate::store::EncryptedStore;
use crate::types::Record;
use std::sync::Arc;
use strongbox_storage::{FileBackend, StorageBackend};

/// A handle on one data directory and its schema.
///
/// Every operation names the model it acts on. Reads never write; each
/// successful mutation is persisted before the call returns.
///
/// ```rust,no_run
/// # async fn demo() -> strongbox_core::CoreResult<()> {
/// use serde_json::json;
/// use strongbox_core::query::{CreateArgs, FindManyArgs, OperationArgs};
/// use strongbox_core::{record, Client, Config};
///
/// let client = Client::open(Config::from_schema_file("schema.json").data_dir("./data"))?;
/// client
///     .create("User", CreateArgs::new(record(json!({"email": "a@x.com", "age": 20}))))
///     .await?;
/// let adults = client
///     .find_many("User", FindManyArgs::from_json(json!({"where": {"age": {"gte": 18}}}))?)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    schema: Arc<SchemaDefinition>,
    cache: CollectionCache,
}

impl Client {
    /// Opens a client on the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns a schema error for an unreadable or invalid schema, a
    /// storage error if the data directory cannot be opened, and a
    /// corruption error for damaged key material.
    pub fn open(config: Config) -> CoreResult<Self> {
        let schema = config.load_schema()?;
        let backend = FileBackend::open(&config.data_dir, config.create_if_missing)?;
        tracing::info!(
            data_dir = %config.data_dir.display(),
            models = schema.models().count(),
            encrypted = config.encryption.is_enabled(),
            "opening client"
        );
        Self::with_backend(schema, Arc::new(backend), &config.encryption)
    }

    /// Builds a client over any storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if key material cannot be resolved.
    pub fn with_backend(
        schema: SchemaDefinition,
        backend: Arc<dyn StorageBackend>,
        encryption: &EncryptionMode,
    ) -> CoreResult<Self> {
        let store = EncryptedStore::open(backend, encryption)?;
        Ok(Self {
            schema: Arc::new(schema),
            cache: CollectionCache::new(Arc::new(store)),
        })
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    fn pipeline(&self, model: &str) -> CoreResult<MutationPipeline> {
        Ok(MutationPipeline::new(self.schema.require(model)?))
    }

    /// Creates a record and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns a validation or unique constraint error if the data breaks a
    /// schema rule, and a storage error if the save fails.
    pub async fn create(&self, model: &str, args: CreateArgs) -> CoreResult<Record> {
        let pipeline = self.writer(model, &[&args.data]).await?;

        let created = self
            .cache
            .mutate(model, move |records| pipeline.create(records, args.data))
            .await?;
        tracing::debug!(model, "created record");
        Ok(created)
    }

    /// Creates several records in one write. Returns how many were inserted.
    ///
    /// # Errors
    ///
    /// Fails without inserting anything if any record is invalid, or is a
    /// duplicate while `skip_duplicates` is off.
    pub async fn create_many(&self, model: &str, args: CreateManyArgs) -> CoreResult<usize> {
        let rows: Vec<&Record> = args.data.iter().collect();
        let pipeline = self.writer(model, &rows).await?;
        drop(rows);

        let CreateManyArgs {
            data,
            skip_duplicates,
        } = args;
        let inserted = self
            .cache
            .mutate(model, move |records| {
                pipeline.create_many(records, data, skip_duplicates)
            })
            .await?;
        tracing::debug!(model, inserted, "created records");
        Ok(inserted)
    }

    /// Returns every matching record, ordered, paginated and projected.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an `orderBy` or `select` naming
    /// undeclared fields, and a load error if the collection is unreadable.
    pub async fn find_many(&self, model: &str, args: FindManyArgs) -> CoreResult<Vec<Record>> {
        let schema = self.schema.require(model)?;
        args.order_by.validate(&schema)?;
        if let Some(select) = &args.select {
            select.validate(&schema)?;
        }
        self.cache
            .read(model, |records| run_find_many(records, &args))
            .await
    }

    /// Returns the first matching record in the requested order.
    ///
    /// # Errors
    ///
    /// Same as [`find_many`](Self::find_many).
    pub async fn find_first(
        &self,
        model: &str,
        mut args: FindFirstArgs,
    ) -> CoreResult<Option<Record>> {
        args.take = Some(1);
        Ok(self.find_many(model, args).await?.into_iter().next())
    }

    /// Returns the record selected by the id or a unique field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`](crate::CoreError::InvalidQuery)
    /// if the filter does not pin the id or a unique field.
    pub async fn find_unique(
        &self,
        model: &str,
        args: FindUniqueArgs,
    ) -> CoreResult<Option<Record>> {
        let pipeline = self.pipeline(model)?;
        pipeline.require_unique_where(&args.filter)?;
        if let Some(select) = &args.select {
            select.validate(pipeline.model())?;
        }
        self.cache
            .read(model, |records| {
                let found = records.iter().find(|r| args.filter.matches(r));
                project(found.into_iter().collect(), args.select.as_ref())
                    .into_iter()
                    .next()
            })
            .await
    }

    /// Counts matching records.
    ///
    /// # Errors
    ///
    /// Returns a load error if the collection is unreadable.
    pub async fn count(&self, model: &str, args: CountArgs) -> CoreResult<usize> {
        self.schema.require(model)?;
        self.cache
            .read(model, |records| {
                records.iter().filter(|r| args.filter.matches(r)).count()
            })
            .await
    }

    /// Updates the record selected by the id or a unique field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`](crate::CoreError::NotFound) if
    /// nothing matches, or a validation or unique constraint error if the
    /// merged record breaks a rule.
    pub async fn update(&self, model: &str, args: UpdateArgs) -> CoreResult<Record> {
        let pipeline = self.writer(model, &[&args.data]).await?;
        pipeline.require_unique_where(&args.filter)?;

        let UpdateArgs { filter, data } = args;
        self.cache
            .mutate(model, move |records| pipeline.update(records, &filter, &data))
            .await
    }

    /// Updates every matching record. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed patch.
    pub async fn update_many(&self, model: &str, args: UpdateManyArgs) -> CoreResult<usize> {
        let pipeline = self.writer(model, &[&args.data]).await?;

        let UpdateManyArgs { filter, data } = args;
        let updated = self
            .cache
            .mutate(model, move |records| {
                pipeline.update_many(records, &filter, &data)
            })
            .await?;
        tracing::debug!(model, updated, "updated records");
        Ok(updated)
    }

    /// Updates the unique match or creates a record.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update) or [`create`](Self::create).
    pub async fn upsert(&self, model: &str, args: UpsertArgs) -> CoreResult<Record> {
        let pipeline = self.writer(model, &[&args.create, &args.update]).await?;
        pipeline.require_unique_where(&args.filter)?;

        let UpsertArgs {
            filter,
            create,
            update,
        } = args;
        self.cache
            .mutate(model, move |records| {
                pipeline.upsert(records, &filter, create, &update)
            })
            .await
    }

    /// Deletes the record selected by the id or a unique field and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`](crate::CoreError::NotFound) if nothing matches.
    pub async fn delete(&self, model: &str, args: DeleteArgs) -> CoreResult<Record> {
        let pipeline = self.pipeline(model)?;
        pipeline.require_unique_where(&args.filter)?;

        let filter = args.filter;
        self.cache
            .mutate(model, move |records| pipeline.delete(records, &filter))
            .await
    }

    /// Deletes every matching record. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the save fails.
    pub async fn delete_many(&self, model: &str, args: DeleteManyArgs) -> CoreResult<usize> {
        let pipeline = self.pipeline(model)?;

        let filter = args.filter;
        let removed = self
            .cache
            .mutate(model, move |records| pipeline.delete_many(records, &filter))
            .await?;
        tracing::debug!(model, removed, "deleted records");
        Ok(removed)
    }

    /// Drops the cached collection so the next access reads the file again.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownModel`](crate::CoreError::UnknownModel)
    /// for a model the schema lacks.
    pub async fn reload(&self, model: &str) -> CoreResult<()> {
        self.schema.require(model)?;
        self.cache.invalidate(model).await;
        Ok(())
    }

    /// Builds a pipeline that can check the `ref` fields `rows` may set.
    ///
    /// Each model referenced through a field named in `rows`, or through a
    /// field with a default, is snapshotted and attached. The pipeline then
    /// checks the merged values, so patches such as `{"set": v}` or
    /// `{"increment": n}` are covered too.
    async fn writer(&self, model: &str, rows: &[&Record]) -> CoreResult<MutationPipeline> {
        let schema = self.schema.require(model)?;
        let mut pipeline = MutationPipeline::new(Arc::clone(&schema));
        for (field, target) in schema.references() {
            if target == schema.name() {
                continue;
            }
            let touched = schema.field(field).is_some_and(|spec| spec.default.is_some())
                || rows.iter().any(|row| row.contains_key(field));
            if !touched {
                continue;
            }
            let target_schema = self.schema.require(target)?;
            let records = self.cache.snapshot(target).await?;
            pipeline = pipeline.with_foreign_ids(target, target_schema.id_field(), records);
        }
        Ok(pipeline)
    }
}
