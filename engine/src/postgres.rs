use crate::config::PostgresConfig;
use crate::connection::{PgPool, PostgresConnection};
use crate::driver::{Driver, HealthStatus, IndexInfo, ListQuery, QueryTranslator};
use crate::engine::EngineKind;
use crate::sql::{Dialect, SqlBuilder, Statement};
use crate::unique;
use async_trait::async_trait;
use error::{StoreError, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tracing::{debug, info};
use util::{EntityMeta, ID_FIELD};
use value::{Document, StorageTraits, Value};

#[derive(Clone)]
pub struct Postgres {
    pub(crate) pool: Arc<PgPool>,
    pub(crate) builder: SqlBuilder,
}

impl Postgres {
    pub async fn connect(config: &PostgresConfig) -> StoreResult<Self> {
        let connector = PostgresConnection::from_config(config);
        let pool = PgPool::new(
            connector,
            config.pool_size,
            config.connection_lifetime_secs.map(Duration::from_secs),
        )?;
        // fail early on unreachable servers
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(StoreError::backend)?;
        info!("☑️ Connected to postgres database");

        Ok(Postgres {
            pool: Arc::new(pool),
            builder: SqlBuilder::new(Dialect::Postgres, config.layout, config.common.case_sensitive),
        })
    }

    /// Outer error: no client, inner error: the statement failed.
    async fn query(
        &self,
        statement: &Statement,
    ) -> StoreResult<Result<Vec<Row>, tokio_postgres::Error>> {
        debug!("postgres: {}", statement.sql);
        let client = self.pool.get().await?;
        let params = statement
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        Ok(client.query(statement.sql.as_str(), &params).await)
    }

    async fn rows(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        self.query(statement).await?.map_err(StoreError::backend)
    }

    async fn execute(&self, sql: &str) -> StoreResult<()> {
        debug!("postgres: {}", sql);
        let client = self.pool.get().await?;
        client.batch_execute(sql).await.map_err(StoreError::backend)
    }

    async fn count(&self, statement: &Statement) -> StoreResult<u64> {
        let rows = self.rows(statement).await?;
        let count = rows
            .first()
            .map(|row| row.try_get::<_, i64>(0))
            .transpose()
            .map_err(StoreError::backend)?
            .unwrap_or_default();
        Ok(count.max(0) as u64)
    }

    fn decode(&self, meta: &EntityMeta, row: &Row) -> StoreResult<Document> {
        let values = (0..row.len())
            .map(|i| row.try_get::<_, Value>(i))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)?;
        self.builder.decode(meta, values)
    }

    fn first(&self, meta: &EntityMeta, rows: Vec<Row>) -> StoreResult<Option<Document>> {
        rows.first().map(|row| self.decode(meta, row)).transpose()
    }

    /// Writes translate unique violations, everything else stays a backend error.
    async fn write(
        &self,
        meta: &EntityMeta,
        statement: Statement,
        id: &str,
        document: &Document,
    ) -> StoreResult<Option<Document>> {
        match self.query(&statement).await? {
            Ok(rows) => self.first(meta, rows),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                let constraint = err
                    .as_db_error()
                    .and_then(|db| db.constraint())
                    .unwrap_or_default()
                    .to_string();
                Err(unique::from_index(meta, &constraint, id, document))
            }
            Err(err) => Err(StoreError::backend(err)),
        }
    }
}

#[async_trait]
impl Driver for Postgres {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn init(&self, entities: &[Arc<EntityMeta>]) -> StoreResult<()> {
        for meta in entities {
            self.create_collection(meta).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close();
        Ok(())
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

        let total = self.count(&count).await?;
        let documents = self
            .rows(&page)
            .await?
            .iter()
            .map(|row| self.decode(meta, row))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((documents, total))
    }

    async fn get_by_id(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        let rows = self.rows(&self.builder.select_by_id(meta, id)).await?;
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
        let rows = self.rows(&self.builder.delete(meta, id)).await?;
        self.first(meta, rows)
    }

    async fn collection_exists(&self, meta: &EntityMeta) -> StoreResult<bool> {
        Ok(self.count(&self.builder.table_exists(meta)).await? > 0)
    }

    async fn create_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        self.execute(&self.builder.create_table(meta)).await?;
        for index in self.builder.unique_indexes(meta) {
            self.execute(&index).await?;
        }
        info!("Table '{}' ensured to exist.", meta.collection());
        Ok(())
    }

    async fn delete_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        self.execute(&self.builder.drop_table(meta)).await
    }

    async fn list_indexes(&self, meta: &EntityMeta) -> StoreResult<Vec<IndexInfo>> {
        let statement = Statement {
            sql: "SELECT indexname, indexdef FROM pg_indexes WHERE schemaname = current_schema() AND tablename = $1::text ORDER BY indexname".to_string(),
            params: vec![Value::text(meta.collection())],
        };
        let rows = self.rows(&statement).await?;
        let mut indexes = vec![];
        for row in rows {
            let name: String = row.try_get(0).map_err(StoreError::backend)?;
            let definition: String = row.try_get(1).map_err(StoreError::backend)?;
            let fields = if name.ends_with("_pkey") {
                vec![ID_FIELD.to_string()]
            } else {
                unique::group_of_index(meta, &name).unwrap_or_default()
            };
            indexes.push(IndexInfo {
                unique: definition.contains("UNIQUE"),
                name,
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
        Ok(self.count(&self.builder.exists(meta, values, exclude_id)).await? > 0)
    }

    fn storage_traits(&self) -> StorageTraits {
        self.builder.traits
    }

    async fn health(&self, _entities: &[Arc<EntityMeta>]) -> HealthStatus {
        match self.execute("SELECT 1").await {
            Ok(_) => HealthStatus::Healthy,
            Err(err) => HealthStatus::Unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use crate::config::{CommonOptions, Layout, PostgresConfig};
    use crate::driver::{Driver, ListQuery};
    use crate::postgres::Postgres;
    use std::sync::Arc;
    use tracing_test::traced_test;
    use util::{EntityDefinition, EntityMeta, FieldMeta, SortField};
    use value::{Document, FieldType, Value};

    fn config() -> PostgresConfig {
        PostgresConfig {
            host: std::env::var("DOCTRACKS_PG_HOST").unwrap_or("localhost".to_string()),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: std::env::var("DOCTRACKS_PG_PASSWORD").unwrap_or("postgres".to_string()),
            pool_size: 2,
            connection_lifetime_secs: None,
            layout: Layout::Json,
            common: CommonOptions::default(),
        }
    }

    #[tokio::test]
    #[traced_test]
    #[ignore = "needs a running postgres server"]
    pub async fn test_postgres() {
        let pg = Postgres::connect(&config()).await.unwrap();
        let meta = Arc::new(
            EntityMeta::build(
                EntityDefinition::new("PgProbe")
                    .field("email", FieldMeta::new(FieldType::String).unique()),
            )
            .unwrap(),
        );
        pg.delete_collection(&meta).await.unwrap();
        pg.init(&[meta.clone()]).await.unwrap();

        let document = Document::from_pairs(vec![("email", Value::text("a@x.com"))]);
        pg.create(&meta, "one", document.clone()).await.unwrap();
        let err = pg.create(&meta, "two", document).await.unwrap_err();
        assert!(err.is_duplicate());

        let (documents, total) = pg
            .get_list(
                &meta,
                &ListQuery {
                    sort: vec![SortField::asc("id")],
                    limit: 10,
                    substring_match: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(documents[0].get("id"), Some(&Value::text("one")));
        pg.delete_collection(&meta).await.unwrap();
    }
}
