use crate::config::SqliteConfig;
use crate::connection::SqlitePool;
use crate::driver::{Driver, HealthStatus, IndexInfo, ListQuery, QueryTranslator};
use crate::engine::EngineKind;
use crate::sql::{Dialect, SqlBuilder, Statement};
use crate::unique;
use async_trait::async_trait;
use error::{StoreError, StoreResult};
use rusqlite::{Connection, ErrorCode, params_from_iter};
use std::sync::Arc;
use tracing::{debug, info};
use util::{EntityMeta, ID_FIELD};
use value::{Document, StorageTraits, Value};

type Rows = Vec<Vec<Value>>;

#[derive(Clone)]
pub struct Sqlite {
    pub(crate) pool: SqlitePool,
    pub(crate) builder: SqlBuilder,
    pub(crate) path: String,
}

fn query_rows(connection: &mut Connection, statement: &Statement) -> rusqlite::Result<Rows> {
    let mut prepared = connection.prepare_cached(&statement.sql)?;
    let columns = prepared.column_count();
    let rows = prepared.query_map(params_from_iter(statement.params.iter()), |row| {
        (0..columns)
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()
    })?;
    rows.collect()
}

fn is_unique_violation(err: &rusqlite::Error) -> Option<String> {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
        {
            Some(message.clone().unwrap_or_else(|| err.to_string()))
        }
        _ => None,
    }
}

impl Sqlite {
    pub async fn open(config: &SqliteConfig) -> StoreResult<Self> {
        let pool = SqlitePool::open(config)?;
        info!("☑️ Opened sqlite database {}", config.path);
        Ok(Sqlite {
            pool,
            builder: SqlBuilder::new(Dialect::Sqlite, config.layout, config.common.case_sensitive),
            path: config.path.clone(),
        })
    }

    async fn rows(&self, statement: Statement) -> StoreResult<Rows> {
        debug!("sqlite: {}", statement.sql);
        self.pool
            .run(move |connection| query_rows(connection, &statement).map_err(StoreError::backend))
            .await
    }

    async fn execute(&self, sql: String) -> StoreResult<()> {
        debug!("sqlite: {}", sql);
        self.pool
            .run(move |connection| connection.execute_batch(&sql).map_err(StoreError::backend))
            .await
    }

    async fn count(&self, statement: Statement) -> StoreResult<u64> {
        let rows = self.rows(statement).await?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .map(|v| v.as_int())
            .transpose()
            .map_err(StoreError::backend_msg)?
            .unwrap_or_default();
        Ok(count.max(0) as u64)
    }

    fn first(&self, meta: &EntityMeta, rows: Rows) -> StoreResult<Option<Document>> {
        rows.into_iter()
            .next()
            .map(|row| self.builder.decode(meta, row))
            .transpose()
    }

    async fn write(
        &self,
        meta: &EntityMeta,
        statement: Statement,
        id: &str,
        document: &Document,
    ) -> StoreResult<Option<Document>> {
        debug!("sqlite: {}", statement.sql);
        let outcome = self
            .pool
            .run(move |connection| Ok(query_rows(connection, &statement)))
            .await?;
        match outcome {
            Ok(rows) => self.first(meta, rows),
            Err(err) => match is_unique_violation(&err) {
                Some(message) => Err(match unique::sqlite_violation(&message) {
                    Some(violation) => violation.into_error(meta, id, document),
                    None => unique::duplicate(meta, vec![ID_FIELD.to_string()], id, document),
                }),
                None => Err(StoreError::backend(err)),
            },
        }
    }
}

#[async_trait]
impl Driver for Sqlite {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    async fn init(&self, entities: &[Arc<EntityMeta>]) -> StoreResult<()> {
        for meta in entities {
            self.create_collection(meta).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.execute("PRAGMA optimize".to_string()).await
    }

    fn id_field(&self) -> &'static str {
        ID_FIELD
    }

    async fn get_list(
        &self,
        meta: &EntityMeta,
        query: &ListQuery,
    ) -> StoreResult<(Vec<Document>, u64)> {
        let filter = self
            .builder
            .build_query_filter(meta, &query.filter, query.substring_match)?;
        let order = self.builder.build_sort_spec(meta, &query.sort)?;
        let (page, count) = self
            .builder
            .list(meta, &filter, &order, query.offset, query.limit);

        let total = self.count(count).await?;
        let documents = self
            .rows(page)
            .await?
            .into_iter()
            .map(|row| self.builder.decode(meta, row))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((documents, total))
    }

    async fn get_by_id(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        let rows = self.rows(self.builder.select_by_id(meta, id)).await?;
        self.first(meta, rows)
    }

    async fn create(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Document> {
        let statement = self.builder.insert(meta, id, document.clone());
        self.write(meta, statement, id, &document)
            .await?
            .ok_or_else(|| StoreError::backend_msg("insert returned no row"))
    }

    async fn update(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        let statement = self.builder.update(meta, id, document.clone());
        self.write(meta, statement, id, &document).await
    }

    async fn delete(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        let rows = self.rows(self.builder.delete(meta, id)).await?;
        self.first(meta, rows)
    }

    async fn collection_exists(&self, meta: &EntityMeta) -> StoreResult<bool> {
        Ok(self.count(self.builder.table_exists(meta)).await? > 0)
    }

    async fn create_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        let mut statements = vec![self.builder.create_table(meta)];
        statements.extend(self.builder.unique_indexes(meta));
        self.execute(statements.join(";\n")).await?;
        info!("Table '{}' ensured to exist.", meta.collection());
        Ok(())
    }

    async fn delete_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        self.execute(self.builder.drop_table(meta)).await
    }

    async fn list_indexes(&self, meta: &EntityMeta) -> StoreResult<Vec<IndexInfo>> {
        let table = meta.collection().to_string();
        let listed = self
            .pool
            .run(move |connection| {
                let list = Statement {
                    sql: "SELECT name, \"unique\", origin FROM pragma_index_list(?1) ORDER BY name"
                        .to_string(),
                    params: vec![Value::text(&table)],
                };
                let mut indexes = vec![];
                for row in query_rows(connection, &list).map_err(StoreError::backend)? {
                    let [name, unique, origin] = <[Value; 3]>::try_from(row)
                        .map_err(|_| StoreError::backend_msg("unexpected index list row"))?;
                    let info = Statement {
                        sql: "SELECT name FROM pragma_index_info(?1) ORDER BY seqno".to_string(),
                        params: vec![name.clone()],
                    };
                    let columns = query_rows(connection, &info)
                        .map_err(StoreError::backend)?
                        .into_iter()
                        .filter_map(|row| row.into_iter().next())
                        .collect::<Vec<_>>();
                    indexes.push((name, unique, origin, columns));
                }
                Ok(indexes)
            })
            .await?;

        Ok(listed
            .into_iter()
            .map(|(name, unique, origin, columns)| {
                let name = name.to_plain_string();
                let fields = if origin.as_str() == Some("pk") {
                    vec![ID_FIELD.to_string()]
                } else if !columns.is_empty() && columns.iter().all(|c| !c.is_null()) {
                    let columns = columns.iter().filter_map(|c| c.as_str()).collect::<Vec<_>>();
                    unique::group_of_columns(meta, &columns)
                        .unwrap_or_else(|| columns.iter().map(|c| c.to_string()).collect())
                } else {
                    unique::group_of_index(meta, &name).unwrap_or_default()
                };
                IndexInfo {
                    name,
                    fields,
                    unique: unique.as_bool().unwrap_or(false),
                }
            })
            .collect())
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
        Ok(self.count(self.builder.exists(meta, values, exclude_id)).await? > 0)
    }

    fn storage_traits(&self) -> StorageTraits {
        self.builder.traits
    }

    async fn health(&self, _entities: &[Arc<EntityMeta>]) -> HealthStatus {
        match self.execute("SELECT 1".to_string()).await {
            Ok(_) => HealthStatus::Healthy,
            Err(err) => HealthStatus::Unavailable(format!("{}: {}", self.path, err)),
        }
    }
}
