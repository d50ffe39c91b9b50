use crate::config::StoreConfig;
use crate::fk::{FkMode, FkResolver};
use crate::normalize;
use crate::uniqueness::check_synthetic;
use engine::{Driver, Engine, HealthStatus, ListQuery};
use error::{Operation, StoreError, StoreResult, Warning};
use std::sync::Arc;
use tracing::{debug, info};
use util::{
    AllowAll, EntityMeta, ID_FIELD, ListParams, MetadataProvider, MetadataValidator,
    NotificationSink, PermissionGate, TracingSink, Validator, ViewSpec, effective_sort, new_id,
    normalize_id,
};
use value::Document;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListOutcome {
    pub documents: Vec<Document>,
    /// matches over all pages
    pub total: u64,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetOutcome {
    pub document: Option<Document>,
    pub count: u64,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SaveOutcome {
    pub document: Document,
    pub count: u64,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteOutcome {
    pub document: Option<Document>,
    pub count: u64,
}

/// Runs the generic document operations against whichever driver is active.
#[derive(Clone)]
pub struct DocumentManager {
    driver: Arc<dyn Driver>,
    metadata: Arc<dyn MetadataProvider>,
    permissions: Arc<dyn PermissionGate>,
    validator: Arc<dyn Validator>,
    sink: Arc<dyn NotificationSink>,
}

impl DocumentManager {
    pub fn new(driver: Arc<dyn Driver>, metadata: Arc<dyn MetadataProvider>) -> Self {
        DocumentManager {
            driver,
            metadata,
            permissions: Arc::new(AllowAll),
            validator: Arc::new(MetadataValidator),
            sink: Arc::new(TracingSink),
        }
    }

    /// Connects the configured engine and loads the entity schema.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let registry = config.registry()?;
        let engine = Engine::connect(&config.engine).await?;
        info!(
            "Document manager on {} with {} entities",
            engine,
            registry.entities().count()
        );
        Ok(DocumentManager::new(Arc::new(engine), Arc::new(registry)))
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionGate>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    fn entities(&self) -> Vec<Arc<EntityMeta>> {
        self.metadata
            .list_entities()
            .iter()
            .filter_map(|name| self.metadata.entity(name))
            .collect()
    }

    /// Creates missing collections and unique indexes of every known entity.
    pub async fn init(&self) -> StoreResult<()> {
        let entities = self.entities();
        self.driver
            .init(&entities)
            .await
            .map_err(|err| self.fail("*", Operation::Schema, err))
    }

    pub async fn close(&self) -> StoreResult<()> {
        self.driver.close().await
    }

    pub async fn health(&self) -> HealthStatus {
        self.driver.health(&self.entities()).await
    }

    fn meta(&self, entity: &str) -> StoreResult<Arc<EntityMeta>> {
        self.metadata
            .entity(entity)
            .ok_or_else(|| StoreError::invalid(format!("unknown entity '{}'", entity)))
    }

    /// Adds context to untyped failures and reports them to the sink.
    fn fail(&self, entity: &str, operation: Operation, err: StoreError) -> StoreError {
        match err.in_context(entity, operation) {
            err @ StoreError::Database { .. } => self.sink.error(err),
            err => err,
        }
    }

    fn report(&self, warnings: &[Warning]) {
        for warning in warnings {
            self.sink.warning(warning);
        }
    }

    fn resolver(&self) -> FkResolver<'_> {
        FkResolver {
            driver: self.driver.as_ref(),
            metadata: self.metadata.as_ref(),
        }
    }

    /// Stored document in its response form with validation and expansion
    /// warnings.
    async fn present(
        &self,
        meta: &EntityMeta,
        stored: Document,
        view: &ViewSpec,
    ) -> StoreResult<(Document, Vec<Warning>)> {
        let mut document = normalize::response(meta, self.driver.id_field(), stored);
        let mut warnings = self.validator.validate_model(meta, &document);
        warnings.extend(
            self.resolver()
                .process(meta, &mut document, view, FkMode::Expand)
                .await?,
        );
        Ok((document, warnings))
    }

    pub async fn list(&self, entity: &str, params: &ListParams) -> StoreResult<ListOutcome> {
        self.list_inner(entity, params)
            .await
            .map_err(|err| self.fail(entity, Operation::List, err))
    }

    async fn list_inner(&self, entity: &str, params: &ListParams) -> StoreResult<ListOutcome> {
        let meta = self.meta(entity)?;
        self.permissions.permitted(meta.name(), Operation::List)?;
        params.check()?;

        let query = ListQuery {
            filter: params.filter.clone().resolve(&meta)?,
            sort: effective_sort(&meta, &params.sort)?,
            offset: params.offset(),
            limit: params.page_size,
            substring_match: params.substring_match,
        };
        debug!("list {} {:?}", meta.name(), query);
        let (stored, total) = self.driver.get_list(&meta, &query).await?;

        let mut outcome = ListOutcome {
            total,
            ..ListOutcome::default()
        };
        for stored in stored {
            let (document, warnings) = self.present(&meta, stored, &params.view).await?;
            outcome.documents.push(document);
            outcome.warnings.extend(warnings);
        }
        self.report(&outcome.warnings);
        Ok(outcome)
    }

    /// Document with the given id. Absence is an error only for `top_level`
    /// callers, everyone else gets an empty outcome.
    pub async fn get_by_id(
        &self,
        entity: &str,
        id: &str,
        view: &ViewSpec,
        top_level: bool,
    ) -> StoreResult<GetOutcome> {
        self.get_inner(entity, id, view, top_level)
            .await
            .map_err(|err| self.fail(entity, Operation::Get, err))
    }

    async fn get_inner(
        &self,
        entity: &str,
        id: &str,
        view: &ViewSpec,
        top_level: bool,
    ) -> StoreResult<GetOutcome> {
        let meta = self.meta(entity)?;
        self.permissions.permitted(meta.name(), Operation::Get)?;
        let id = normalize_id(id);

        let Some(stored) = self.driver.get_by_id(&meta, &id).await? else {
            return match top_level {
                true => Err(StoreError::not_found(meta.name(), id)),
                false => Ok(GetOutcome::default()),
            };
        };
        let (document, warnings) = self.present(&meta, stored, view).await?;
        self.report(&warnings);
        Ok(GetOutcome {
            document: Some(document),
            count: 1,
            warnings,
        })
    }

    pub async fn create(&self, entity: &str, data: Document) -> StoreResult<SaveOutcome> {
        self.save(entity, None, data)
            .await
            .map_err(|err| self.fail(entity, Operation::Create, err))
    }

    /// Merges `data` over the stored document, the identifier never changes.
    pub async fn update(&self, entity: &str, id: &str, data: Document) -> StoreResult<SaveOutcome> {
        self.save(entity, Some(id), data)
            .await
            .map_err(|err| self.fail(entity, Operation::Update, err))
    }

    async fn save(&self, entity: &str, id: Option<&str>, data: Document) -> StoreResult<SaveOutcome> {
        let meta = self.meta(entity)?;
        let operation = match id {
            None => Operation::Create,
            Some(_) => Operation::Update,
        };
        self.permissions.permitted(meta.name(), operation)?;

        let (payload_id, payload) = normalize::payload(&meta, self.driver.id_field(), data);
        let (id, mut document) = match id {
            None => (payload_id.unwrap_or_else(new_id), payload),
            Some(id) => {
                let id = normalize_id(id);
                let Some(stored) = self.driver.get_by_id(&meta, &id).await? else {
                    return Err(StoreError::not_found(meta.name(), id));
                };
                let mut merged = normalize::response(&meta, self.driver.id_field(), stored);
                merged.remove(ID_FIELD);
                merged.merge(payload);
                (id, merged)
            }
        };
        document.insert_first(ID_FIELD, id.as_str());

        let mut warnings = self.validator.validate_model(&meta, &document);
        let exclude = match operation {
            Operation::Update => Some(id.as_str()),
            _ => None,
        };
        check_synthetic(self.driver.as_ref(), &meta, &id, &document, exclude).await?;
        warnings.extend(
            self.resolver()
                .process(&meta, &mut document, &ViewSpec::new(), FkMode::Validate)
                .await?,
        );

        document.remove(ID_FIELD);
        normalize::stamp(&meta, &mut document, operation == Operation::Create);
        let stored = normalize::storage(&meta, document, &self.driver.storage_traits());
        debug!("{} {} '{}'", operation, meta.name(), id);

        let saved = match operation {
            Operation::Create => self.driver.create(&meta, &id, stored).await?,
            _ => self
                .driver
                .update(&meta, &id, stored)
                .await?
                .ok_or_else(|| StoreError::not_found(meta.name(), &id))?,
        };
        let document = normalize::response(&meta, self.driver.id_field(), saved);
        self.report(&warnings);
        Ok(SaveOutcome {
            document,
            count: 1,
            warnings,
        })
    }

    /// Removes a document, removing an absent one succeeds with a count of 0.
    pub async fn delete(&self, entity: &str, id: &str) -> StoreResult<DeleteOutcome> {
        self.delete_inner(entity, id)
            .await
            .map_err(|err| self.fail(entity, Operation::Delete, err))
    }

    async fn delete_inner(&self, entity: &str, id: &str) -> StoreResult<DeleteOutcome> {
        let meta = self.meta(entity)?;
        self.permissions.permitted(meta.name(), Operation::Delete)?;
        let id = normalize_id(id);

        let removed = self.driver.delete(&meta, &id).await?;
        let count = removed.is_some() as u64;
        Ok(DeleteOutcome {
            document: removed.map(|d| normalize::response(&meta, self.driver.id_field(), d)),
            count,
        })
    }
}
