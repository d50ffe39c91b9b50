use crate::config::MongoConfig;
use crate::driver::{
    Driver, HealthStatus, IndexInfo, ListQuery, QueryTranslator, exact_match, list_match,
    sorts_case_insensitive, values_filter,
};
use crate::engine::EngineKind;
use crate::unique;
use async_trait::async_trait;
use error::{StoreError, StoreResult};
use futures_util::StreamExt;
use mongodb::bson::{Bson, Document as BsonDocument, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, Collation, CollationStrength, IndexOptions, ReturnDocument, ServerApi,
    ServerApiVersion,
};
use mongodb::{Client, Collection, Database, IndexModel};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};
use util::{Condition, EntityMeta, Filter, ID_FIELD, MatchKind, RangeOp, SortField};
use value::{Document, FieldType, StorageTraits, Value, to_storage};

const MONGO_ID: &str = "_id";
const DUPLICATE_KEY: i32 = 11000;

/// Builds mongodb filter and sort documents.
#[derive(Clone, Debug)]
pub struct MongoTranslator {
    pub(crate) case_sensitive: bool,
}

impl MongoTranslator {
    fn key(field: &str) -> &str {
        if field == ID_FIELD { MONGO_ID } else { field }
    }

    fn condition(
        &self,
        meta: &EntityMeta,
        field: &str,
        condition: &Condition,
        kind: MatchKind,
    ) -> Bson {
        let field_type = meta.field_type(field).unwrap_or(FieldType::String);
        match condition {
            Condition::Eq(value) => {
                let value = to_storage(field_type, value.clone(), &StorageTraits::NATIVE);
                match (kind, &value) {
                    (_, Value::Null) => Bson::Null,
                    (MatchKind::Substring, _) => Bson::Document(doc! {
                        "$regex": regex::escape(&value.to_plain_string()),
                        "$options": "i",
                    }),
                    (MatchKind::ExactIgnoreCase, _) => Bson::Document(doc! {
                        "$regex": format!("^{}$", regex::escape(&value.to_plain_string())),
                        "$options": "i",
                    }),
                    (MatchKind::Exact, _) => Bson::from(&value),
                }
            }
            Condition::Range(range) => {
                // absent and null fields never satisfy a range
                let mut bounds = doc! { "$exists": true, "$ne": Bson::Null };
                for (op, bound) in range.bounds() {
                    let operator = match op {
                        RangeOp::Gt => "$gt",
                        RangeOp::Gte => "$gte",
                        RangeOp::Lt => "$lt",
                        RangeOp::Lte => "$lte",
                    };
                    let bound = to_storage(field_type, bound.clone(), &StorageTraits::NATIVE);
                    bounds.insert(operator, Bson::from(&bound));
                }
                Bson::Document(bounds)
            }
        }
    }

    fn filter_with(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        kind_of: impl Fn(&str) -> MatchKind,
    ) -> BsonDocument {
        let mut query = BsonDocument::new();
        for (field, condition) in filter.iter() {
            query.insert(
                Self::key(field),
                self.condition(meta, field, condition, kind_of(field)),
            );
        }
        query
    }

    /// Collation making the sort of text fields ignore case.
    ///
    /// It applies to the whole query, so equality on enum fields ignores case as well.
    pub fn collation(&self, meta: &EntityMeta, sort: &[SortField]) -> Option<Collation> {
        sort.iter()
            .any(|s| sorts_case_insensitive(meta, &s.field, self.case_sensitive))
            .then(|| {
                Collation::builder()
                    .locale("en".to_string())
                    .strength(CollationStrength::Secondary)
                    .build()
            })
    }
}

impl QueryTranslator for MongoTranslator {
    type Filter = BsonDocument;
    type Sort = BsonDocument;

    fn build_query_filter(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        substring_match: bool,
    ) -> StoreResult<BsonDocument> {
        Ok(self.filter_with(meta, filter, list_match(meta, substring_match)))
    }

    fn build_sort_spec(&self, _meta: &EntityMeta, sort: &[SortField]) -> StoreResult<BsonDocument> {
        let mut spec = BsonDocument::new();
        for field in sort {
            let direction = if field.direction.is_desc() { -1 } else { 1 };
            spec.insert(Self::key(&field.field), direction);
        }
        Ok(spec)
    }
}

#[derive(Clone, Debug)]
pub struct MongoDB {
    pub(crate) client: Client,
    pub(crate) database: Database,
    pub(crate) translator: MongoTranslator,
    pub(crate) command_timeout: Duration,
}

impl MongoDB {
    pub async fn connect(config: &MongoConfig) -> StoreResult<Self> {
        let mut client_options = ClientOptions::parse(&config.uri)
            .await
            .map_err(StoreError::backend)?;

        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);
        client_options.connect_timeout = Some(config.common.command_timeout());
        client_options.server_selection_timeout = Some(config.common.command_timeout());

        let client = Client::with_options(client_options).map_err(StoreError::backend)?;
        let mongo = MongoDB {
            database: client.database(&config.database),
            client,
            translator: MongoTranslator {
                case_sensitive: config.common.case_sensitive,
            },
            command_timeout: config.common.command_timeout(),
        };
        mongo.ping().await?;
        info!("☑️ Connected to mongoDB database");
        Ok(mongo)
    }

    async fn ping(&self) -> StoreResult<()> {
        timeout(
            self.command_timeout,
            self.client.database("admin").run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| StoreError::backend_msg("timeout while pinging mongodb"))?
        .map_err(StoreError::backend)?;
        Ok(())
    }

    fn collection(&self, meta: &EntityMeta) -> Collection<BsonDocument> {
        self.database.collection(meta.collection())
    }

    fn stored(id: &str, document: &Document) -> BsonDocument {
        let mut stored = doc! { MONGO_ID: id };
        stored.extend(BsonDocument::from(document));
        stored
    }

    /// Duplicate key failures become [`StoreError::DuplicateConstraint`].
    fn write_error(
        meta: &EntityMeta,
        id: &str,
        document: &Document,
        err: mongodb::error::Error,
    ) -> StoreError {
        let message = match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
                Some(e.message.clone())
            }
            ErrorKind::Command(e) if e.code == DUPLICATE_KEY => Some(e.message.clone()),
            _ => None,
        };
        match message {
            Some(message) => {
                let index = unique::mongo_index(&message).unwrap_or("_id_");
                unique::from_index(meta, index, id, document)
            }
            None => StoreError::backend(err),
        }
    }
}

#[async_trait]
impl Driver for MongoDB {
    fn kind(&self) -> EngineKind {
        EngineKind::MongoDB
    }

    async fn init(&self, entities: &[Arc<EntityMeta>]) -> StoreResult<()> {
        for meta in entities {
            self.create_collection(meta).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }

    fn id_field(&self) -> &'static str {
        MONGO_ID
    }

    async fn get_list(
        &self,
        meta: &EntityMeta,
        query: &ListQuery,
    ) -> StoreResult<(Vec<Document>, u64)> {
        let filter = self
            .translator
            .build_query_filter(meta, &query.filter, query.substring_match)?;
        let sort = self.translator.build_sort_spec(meta, &query.sort)?;
        let collation = self.translator.collation(meta, &query.sort);
        debug!("mongodb: filter {} sort {}", filter, sort);

        let collection = self.collection(meta);
        let mut count = collection.count_documents(filter.clone());
        let mut find = collection
            .find(filter)
            .sort(sort)
            .skip(query.offset)
            .limit(query.limit as i64);
        if let Some(collation) = collation {
            count = count.collation(collation.clone());
            find = find.collation(collation);
        }

        let total = count.await.map_err(StoreError::backend)?;
        let mut cursor = find.await.map_err(StoreError::backend)?;
        let mut documents = vec![];
        while let Some(document) = cursor.next().await {
            documents.push(Document::from(document.map_err(StoreError::backend)?));
        }
        Ok((documents, total))
    }

    async fn get_by_id(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .collection(meta)
            .find_one(doc! { MONGO_ID: id })
            .await
            .map_err(StoreError::backend)?
            .map(Document::from))
    }

    async fn create(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Document> {
        let stored = Self::stored(id, &document);
        self.collection(meta)
            .insert_one(&stored)
            .await
            .map_err(|err| Self::write_error(meta, id, &document, err))?;
        Ok(Document::from(stored))
    }

    async fn update(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        Ok(self
            .collection(meta)
            .find_one_and_replace(doc! { MONGO_ID: id }, Self::stored(id, &document))
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| Self::write_error(meta, id, &document, err))?
            .map(Document::from))
    }

    async fn delete(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .collection(meta)
            .find_one_and_delete(doc! { MONGO_ID: id })
            .await
            .map_err(StoreError::backend)?
            .map(Document::from))
    }

    async fn collection_exists(&self, meta: &EntityMeta) -> StoreResult<bool> {
        let names = self
            .database
            .list_collection_names()
            .await
            .map_err(StoreError::backend)?;
        Ok(names.iter().any(|name| name == meta.collection()))
    }

    async fn create_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        if !self.collection_exists(meta).await? {
            self.database
                .create_collection(meta.collection())
                .await
                .map_err(StoreError::backend)?;
        }

        let collection = self.collection(meta);
        for group in meta.unique_groups() {
            let mut keys = BsonDocument::new();
            let mut present = BsonDocument::new();
            for field in group {
                keys.insert(field, 1);
                present.insert(field, doc! { "$exists": true });
            }
            // documents lacking a member of the group are not constrained
            let options = IndexOptions::builder()
                .name(unique::index_name(meta.collection(), group))
                .unique(true)
                .partial_filter_expression(present)
                .build();
            collection
                .create_index(IndexModel::builder().keys(keys).options(options).build())
                .await
                .map_err(StoreError::backend)?;
        }
        info!("Collection '{}' ensured to exist.", meta.collection());
        Ok(())
    }

    async fn delete_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        self.collection(meta).drop().await.map_err(StoreError::backend)
    }

    async fn list_indexes(&self, meta: &EntityMeta) -> StoreResult<Vec<IndexInfo>> {
        let mut cursor = self
            .collection(meta)
            .list_indexes()
            .await
            .map_err(StoreError::backend)?;
        let mut indexes = vec![];
        while let Some(model) = cursor.next().await {
            let model = model.map_err(StoreError::backend)?;
            let options = model.options.unwrap_or_default();
            let fields = model
                .keys
                .keys()
                .map(|key| {
                    if key == MONGO_ID {
                        ID_FIELD.to_string()
                    } else {
                        key.to_string()
                    }
                })
                .collect::<Vec<_>>();
            indexes.push(IndexInfo {
                name: options.name.unwrap_or_default(),
                // the primary key index is unique without saying so
                unique: options.unique.unwrap_or(false) || fields == [ID_FIELD],
                fields,
            });
        }
        Ok(indexes)
    }

    fn supports_native_indexes(&self) -> bool {
        true
    }

    async fn document_exists_with_field_value(
        &self,
        meta: &EntityMeta,
        values: &[(String, Value)],
        exclude_id: Option<&str>,
    ) -> StoreResult<bool> {
        let mut filter = self
            .translator
            .filter_with(meta, &values_filter(values), exact_match);
        if let Some(id) = exclude_id {
            filter.insert(MONGO_ID, doc! { "$ne": id });
        }
        let count = self
            .collection(meta)
            .count_documents(filter)
            .limit(1)
            .await
            .map_err(StoreError::backend)?;
        Ok(count > 0)
    }

    fn storage_traits(&self) -> StorageTraits {
        StorageTraits::NATIVE
    }

    async fn health(&self, _entities: &[Arc<EntityMeta>]) -> HealthStatus {
        match self.ping().await {
            Ok(_) => HealthStatus::Healthy,
            Err(err) => HealthStatus::Unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use crate::config::{CommonOptions, MongoConfig};
    use crate::driver::{Driver, QueryTranslator};
    use crate::mongo::{MongoDB, MongoTranslator};
    use mongodb::bson::{Bson, doc};
    use std::sync::Arc;
    use tracing_test::traced_test;
    use util::{EntityDefinition, EntityMeta, FieldMeta, Filter, SortField};
    use value::{Document, FieldType, Value};

    fn meta() -> EntityMeta {
        EntityMeta::build(
            EntityDefinition::new("Event")
                .field("title", FieldMeta::new(FieldType::String))
                .field(
                    "status",
                    FieldMeta::new(FieldType::String).enum_values(&["open", "closed"]),
                )
                .field("cost", FieldMeta::new(FieldType::Currency))
                .field("email", FieldMeta::new(FieldType::String).unique()),
        )
        .unwrap()
    }

    #[test]
    fn filters() {
        let meta = meta();
        let translator = MongoTranslator {
            case_sensitive: false,
        };
        let filter = Filter::parse(
            &meta,
            &[("title", "a.b"), ("status", "open"), ("cost", "gte:0"), ("id", "ABC")],
        )
        .unwrap();

        let query = translator.build_query_filter(&meta, &filter, true).unwrap();
        assert_eq!(
            query,
            doc! {
                "title": { "$regex": "a\\.b", "$options": "i" },
                "status": "open",
                "cost": { "$exists": true, "$ne": Bson::Null, "$gte": 0.0 },
                "_id": "abc",
            }
        );

        let exact = translator.build_query_filter(&meta, &filter, false).unwrap();
        assert_eq!(
            exact.get_document("title").unwrap(),
            &doc! { "$regex": "^a\\.b$", "$options": "i" }
        );
    }

    #[test]
    fn sorts() {
        let meta = meta();
        let translator = MongoTranslator {
            case_sensitive: false,
        };
        let sort = vec![SortField::desc("cost"), SortField::asc("id")];
        assert_eq!(
            translator.build_sort_spec(&meta, &sort).unwrap(),
            doc! { "cost": -1, "_id": 1 }
        );
        assert!(translator.collation(&meta, &sort).is_none());
        assert!(
            translator
                .collation(&meta, &[SortField::asc("title")])
                .is_some()
        );

        let sensitive = MongoTranslator {
            case_sensitive: true,
        };
        assert!(
            sensitive
                .collation(&meta, &[SortField::asc("title")])
                .is_none()
        );
    }

    #[tokio::test]
    #[traced_test]
    #[ignore = "needs a running mongodb server"]
    pub async fn test_mongo() {
        let config = MongoConfig {
            uri: std::env::var("DOCTRACKS_MONGO_URI")
                .unwrap_or("mongodb://localhost:27017".to_string()),
            database: "doctracks_test".to_string(),
            common: CommonOptions::default(),
        };
        let mongo = MongoDB::connect(&config).await.unwrap();
        let meta = Arc::new(meta());
        mongo.delete_collection(&meta).await.unwrap();
        mongo.init(&[meta.clone()]).await.unwrap();

        let document = Document::from_pairs(vec![("email", Value::text("a@x.com"))]);
        mongo.create(&meta, "one", document.clone()).await.unwrap();
        let err = mongo.create(&meta, "two", document).await.unwrap_err();
        assert!(err.is_duplicate());
        assert!(mongo.delete(&meta, "two").await.unwrap().is_none());
        mongo.delete_collection(&meta).await.unwrap();
    }
}
