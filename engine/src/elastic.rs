use crate::config::ElasticConfig;
use crate::driver::{
    Driver, HealthStatus, IndexInfo, ListQuery, QueryTranslator, exact_match, list_match,
    sorts_case_insensitive, values_filter,
};
use crate::engine::EngineKind;
use crate::unique;
use async_trait::async_trait;
use error::{StoreError, StoreResult};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Map, json};
use std::sync::Arc;
use tracing::{debug, info, warn};
use util::{Condition, EntityMeta, Filter, ID_FIELD, MatchKind, RangeOp, SortField};
use value::{Document, FieldType, StorageTraits, Value, to_storage};

type Json = serde_json::Value;

const ELASTIC_ID: &str = "_id";
const NORMALIZER: &str = "lowercase_normalizer";
const LOWERCASE_SORT: &str =
    "doc[params.f].size() == 0 ? '' : doc[params.f].value.toLowerCase()";

/// Escapes the wildcard syntax characters `*`, `?` and `\`.
fn escape_wildcard(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Builds elasticsearch query and sort clauses.
#[derive(Clone, Debug)]
pub struct ElasticTranslator {
    pub(crate) case_sensitive: bool,
}

impl ElasticTranslator {
    fn json(meta: &EntityMeta, field: &str, value: &Value) -> Json {
        if field == ID_FIELD {
            return Json::from(value);
        }
        let field_type = meta.field_type(field).unwrap_or(FieldType::String);
        Json::from(to_storage(field_type, value.clone(), &StorageTraits::JSON))
    }

    fn condition(
        &self,
        meta: &EntityMeta,
        field: &str,
        condition: &Condition,
        kind: MatchKind,
    ) -> Vec<Json> {
        match condition {
            Condition::Eq(value) if value.is_null() => {
                vec![json!({ "bool": { "must_not": { "exists": { "field": field } } } })]
            }
            Condition::Eq(value) if field == ID_FIELD => {
                vec![json!({ "ids": { "values": [value.to_plain_string()] } })]
            }
            Condition::Eq(value) => {
                let clause = match kind {
                    MatchKind::Substring => json!({ "wildcard": { field: {
                        "value": format!("*{}*", escape_wildcard(&value.to_plain_string())),
                        "case_insensitive": true,
                    } } }),
                    MatchKind::ExactIgnoreCase => json!({ "term": { field: {
                        "value": Self::json(meta, field, value),
                        "case_insensitive": true,
                    } } }),
                    MatchKind::Exact => json!({ "term": { field: {
                        "value": Self::json(meta, field, value),
                    } } }),
                };
                vec![clause]
            }
            Condition::Range(range) => {
                let mut bounds = Map::new();
                for (op, bound) in range.bounds() {
                    let key = match op {
                        RangeOp::Gt => "gt",
                        RangeOp::Gte => "gte",
                        RangeOp::Lt => "lt",
                        RangeOp::Lte => "lte",
                    };
                    bounds.insert(key.to_string(), Self::json(meta, field, bound));
                }
                // documents without the field must not count
                vec![
                    json!({ "exists": { "field": field } }),
                    json!({ "range": { field: bounds } }),
                ]
            }
        }
    }

    fn clauses(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        kind_of: impl Fn(&str) -> MatchKind,
    ) -> Vec<Json> {
        filter
            .iter()
            .flat_map(|(field, condition)| self.condition(meta, field, condition, kind_of(field)))
            .collect()
    }

    fn query(clauses: Vec<Json>) -> Json {
        if clauses.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "bool": { "filter": clauses } })
        }
    }
}

impl QueryTranslator for ElasticTranslator {
    type Filter = Json;
    type Sort = Vec<Json>;

    fn build_query_filter(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        substring_match: bool,
    ) -> StoreResult<Json> {
        Ok(Self::query(self.clauses(
            meta,
            filter,
            list_match(meta, substring_match),
        )))
    }

    fn build_sort_spec(&self, meta: &EntityMeta, sort: &[SortField]) -> StoreResult<Vec<Json>> {
        Ok(sort
            .iter()
            .map(|spec| {
                let order = if spec.direction.is_desc() { "desc" } else { "asc" };
                // missing values sort as the smallest
                let missing = if spec.direction.is_desc() { "_last" } else { "_first" };
                if sorts_case_insensitive(meta, &spec.field, self.case_sensitive) {
                    json!({ "_script": {
                        "type": "string",
                        "order": order,
                        "script": {
                            "lang": "painless",
                            "source": LOWERCASE_SORT,
                            "params": { "f": spec.field },
                        },
                    } })
                } else {
                    json!({ &spec.field: {
                        "order": order,
                        "missing": missing,
                        "unmapped_type": "keyword",
                    } })
                }
            })
            .collect())
    }
}

/// Index template of an entity: every string is an exact keyword with a
/// lowercase normalizer, json blobs are stored but not indexed.
pub fn index_template(index: &str, meta: &EntityMeta) -> Json {
    let mut properties = Map::new();
    properties.insert(ID_FIELD.to_string(), json!({ "type": "keyword" }));
    for (name, field) in meta.fields() {
        let mapping = match field.field_type {
            FieldType::String => json!({ "type": "keyword", "normalizer": NORMALIZER }),
            FieldType::ObjectId => json!({ "type": "keyword" }),
            FieldType::Integer => json!({ "type": "long" }),
            FieldType::Float | FieldType::Currency => json!({ "type": "double" }),
            FieldType::Boolean => json!({ "type": "boolean" }),
            FieldType::Date | FieldType::Datetime => {
                json!({ "type": "date", "format": "strict_date_optional_time||epoch_millis" })
            }
            FieldType::Json => json!({ "type": "object", "enabled": false }),
        };
        properties.insert(name.clone(), mapping);
    }

    json!({
        "index_patterns": [index],
        "template": {
            "settings": {
                "analysis": {
                    "normalizer": {
                        NORMALIZER: { "type": "custom", "filter": ["lowercase"] }
                    }
                }
            },
            "mappings": {
                "dynamic_templates": [{
                    "strings": {
                        "match_mapping_type": "string",
                        "mapping": { "type": "keyword", "normalizer": NORMALIZER }
                    }
                }],
                "properties": properties,
            }
        }
    })
}

/// Fields mapped as analyzed text with a `raw` keyword subfield, the layout
/// older indexes used before every string became a normalized keyword.
pub fn legacy_fields(mapping: &Json) -> Vec<String> {
    let Some(properties) = mapping.pointer("/mappings/properties").and_then(|p| p.as_object())
    else {
        return vec![];
    };
    properties
        .iter()
        .filter(|(_, property)| {
            property.get("type").and_then(|t| t.as_str()) == Some("text")
                && property.pointer("/fields/raw").is_some()
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Document of a stored `_source`, the mirrored id becomes `_id`.
fn from_source(id: &str, source: &Json) -> StoreResult<Document> {
    let mut document = Document::from_json(source).map_err(StoreError::backend_msg)?;
    document.remove(ID_FIELD);
    document.insert_first(ELASTIC_ID, Value::text(id));
    Ok(document)
}

fn to_source(id: &str, document: &Document) -> Json {
    let mut source = Map::from(document);
    source.insert(ID_FIELD.to_string(), Json::from(id));
    Json::Object(source)
}

#[derive(Clone, Debug)]
pub struct Elastic {
    pub(crate) client: Client,
    pub(crate) url: String,
    pub(crate) prefix: String,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) refresh: String,
    pub(crate) translator: ElasticTranslator,
}

impl Elastic {
    pub async fn connect(config: &ElasticConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.common.command_timeout())
            .build()
            .map_err(StoreError::backend)?;
        let elastic = Elastic {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            prefix: config.index_prefix.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            refresh: config.refresh.clone(),
            translator: ElasticTranslator {
                case_sensitive: config.common.case_sensitive,
            },
        };
        elastic.send(Method::GET, "", None).await?.ok()?;
        info!("☑️ Connected to elasticsearch cluster");
        Ok(elastic)
    }

    fn index(&self, meta: &EntityMeta) -> String {
        format!("{}{}", self.prefix, meta.collection())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.url, path.trim_start_matches('/')));
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<Json>) -> StoreResult<Reply> {
        debug!("elasticsearch: {} /{}", method, path);
        let mut builder = self.request(method.clone(), path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await.map_err(StoreError::backend)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(StoreError::backend)?;
        let body = if bytes.is_empty() {
            Json::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Json::String(String::from_utf8_lossy(&bytes).to_string())
            })
        };
        Ok(Reply {
            status,
            body,
            target: format!("{} /{}", method, path),
        })
    }

    fn refresh(&self) -> String {
        format!("refresh={}", self.refresh)
    }
}

/// Status and body of one request.
struct Reply {
    status: StatusCode,
    body: Json,
    target: String,
}

impl Reply {
    fn ok(self) -> StoreResult<Json> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            Err(StoreError::backend_msg(format!(
                "elasticsearch {} failed with {}: {}",
                self.target, self.status, self.body
            )))
        }
    }
}

#[async_trait]
impl Driver for Elastic {
    fn kind(&self) -> EngineKind {
        EngineKind::Elasticsearch
    }

    async fn init(&self, entities: &[Arc<EntityMeta>]) -> StoreResult<()> {
        for meta in entities {
            self.create_collection(meta).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    fn id_field(&self) -> &'static str {
        ELASTIC_ID
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
        let body = json!({
            "query": filter,
            "sort": sort,
            "from": query.offset,
            "size": query.limit,
            "track_total_hits": true,
        });

        let path = format!("{}/_search", self.index(meta));
        let result = self.send(Method::POST, &path, Some(body)).await?.ok()?;
        let total = result
            .pointer("/hits/total/value")
            .and_then(|t| t.as_u64())
            .unwrap_or_default();
        let documents = result
            .pointer("/hits/hits")
            .and_then(|h| h.as_array())
            .map(|hits| {
                hits.iter()
                    .map(|hit| {
                        let id = hit.get(ELASTIC_ID).and_then(|id| id.as_str()).unwrap_or_default();
                        from_source(id, hit.get("_source").unwrap_or(&Json::Null))
                    })
                    .collect::<StoreResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok((documents, total))
    }

    async fn get_by_id(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        let path = format!("{}/_doc/{}", self.index(meta), id);
        let reply = self.send(Method::GET, &path, None).await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = reply.ok()?;
        match body.get("_source") {
            Some(source) if body.get("found") != Some(&Json::Bool(false)) => {
                Ok(Some(from_source(id, source)?))
            }
            _ => Ok(None),
        }
    }

    async fn create(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Document> {
        let path = format!("{}/_create/{}?{}", self.index(meta), id, self.refresh());
        let source = to_source(id, &document);
        let reply = self.send(Method::PUT, &path, Some(source.clone())).await?;
        if reply.status == StatusCode::CONFLICT {
            return Err(unique::duplicate(
                meta,
                vec![ID_FIELD.to_string()],
                id,
                &document,
            ));
        }
        reply.ok()?;
        from_source(id, &source)
    }

    async fn update(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        if self.get_by_id(meta, id).await?.is_none() {
            return Ok(None);
        }
        let path = format!("{}/_doc/{}?{}", self.index(meta), id, self.refresh());
        let source = to_source(id, &document);
        self.send(Method::PUT, &path, Some(source.clone()))
            .await?
            .ok()?;
        Ok(Some(from_source(id, &source)?))
    }

    async fn delete(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        let Some(existing) = self.get_by_id(meta, id).await? else {
            return Ok(None);
        };
        let path = format!("{}/_doc/{}?{}", self.index(meta), id, self.refresh());
        let reply = self.send(Method::DELETE, &path, None).await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        reply.ok()?;
        Ok(Some(existing))
    }

    async fn collection_exists(&self, meta: &EntityMeta) -> StoreResult<bool> {
        let reply = self.send(Method::HEAD, &self.index(meta), None).await?;
        match reply.status {
            StatusCode::NOT_FOUND => Ok(false),
            _ => reply.ok().map(|_| true),
        }
    }

    async fn create_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        let index = self.index(meta);
        self.send(
            Method::PUT,
            &format!("_index_template/{}", index),
            Some(index_template(&index, meta)),
        )
        .await?
        .ok()?;

        if !self.collection_exists(meta).await? {
            self.send(Method::PUT, &index, None).await?.ok()?;
        }
        info!("Index '{}' ensured to exist.", index);
        Ok(())
    }

    async fn delete_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        let reply = self.send(Method::DELETE, &self.index(meta), None).await?;
        match reply.status {
            StatusCode::NOT_FOUND => Ok(()),
            _ => reply.ok().map(|_| ()),
        }
    }

    async fn list_indexes(&self, _meta: &EntityMeta) -> StoreResult<Vec<IndexInfo>> {
        Ok(vec![])
    }

    fn supports_native_indexes(&self) -> bool {
        false
    }

    async fn document_exists_with_field_value(
        &self,
        meta: &EntityMeta,
        values: &[(String, Value)],
        exclude_id: Option<&str>,
    ) -> StoreResult<bool> {
        let clauses = self
            .translator
            .clauses(meta, &values_filter(values), exact_match);
        let mut query = json!({ "bool": { "filter": clauses } });
        if let Some(id) = exclude_id {
            query["bool"]["must_not"] = json!([{ "ids": { "values": [id] } }]);
        }
        let path = format!("{}/_count", self.index(meta));
        let result = self
            .send(Method::POST, &path, Some(json!({ "query": query })))
            .await?
            .ok()?;
        Ok(result.get("count").and_then(|c| c.as_u64()).unwrap_or_default() > 0)
    }

    fn storage_traits(&self) -> StorageTraits {
        StorageTraits::JSON
    }

    async fn health(&self, entities: &[Arc<EntityMeta>]) -> HealthStatus {
        let cluster = match self.send(Method::GET, "_cluster/health", None).await {
            Ok(reply) => match reply.ok() {
                Ok(body) => body,
                Err(err) => return HealthStatus::Unavailable(err.to_string()),
            },
            Err(err) => return HealthStatus::Unavailable(err.to_string()),
        };
        if cluster.get("status").and_then(|s| s.as_str()) == Some("red") {
            return HealthStatus::Unavailable("cluster status is red".to_string());
        }

        let mut reasons = vec![];
        for meta in entities {
            let index = self.index(meta);
            let mapping = match self.send(Method::GET, &format!("{}/_mapping", index), None).await {
                Ok(reply) if reply.status.is_success() => reply.body,
                Ok(reply) => {
                    reasons.push(format!("mapping of '{}' unavailable: {}", index, reply.status));
                    continue;
                }
                Err(err) => return HealthStatus::Unavailable(err.to_string()),
            };
            let Some(mapping) = mapping.as_object().and_then(|m| m.values().next()) else {
                continue;
            };
            for field in legacy_fields(mapping) {
                warn!("field '{}' of index '{}' is mapped as text with a raw subfield", field, index);
                reasons.push(format!(
                    "field '{}' of index '{}' uses a text mapping with a raw subfield",
                    field, index
                ));
            }
        }

        if reasons.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(reasons)
        }
    }
}

#[cfg(test)]
pub mod tests {
    use crate::config::{CommonOptions, ElasticConfig};
    use crate::driver::{Driver, QueryTranslator};
    use crate::elastic::{Elastic, ElasticTranslator, from_source, index_template, legacy_fields};
    use serde_json::json;
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
                .field("day", FieldMeta::new(FieldType::Date))
                .field("email", FieldMeta::new(FieldType::String).unique()),
        )
        .unwrap()
    }

    fn translator() -> ElasticTranslator {
        ElasticTranslator {
            case_sensitive: false,
        }
    }

    #[test]
    fn filters() {
        let meta = meta();
        let filter = Filter::parse(
            &meta,
            &[("title", "a*b"), ("status", "open"), ("cost", "gte:0"), ("id", "ABC")],
        )
        .unwrap();
        let query = translator().build_query_filter(&meta, &filter, true).unwrap();
        assert_eq!(
            query,
            json!({ "bool": { "filter": [
                { "wildcard": { "title": { "value": "*a\\*b*", "case_insensitive": true } } },
                { "term": { "status": { "value": "open" } } },
                { "exists": { "field": "cost" } },
                { "range": { "cost": { "gte": 0.0 } } },
                { "ids": { "values": ["abc"] } },
            ] } })
        );

        let exact = translator()
            .build_query_filter(&meta, &Filter::parse(&meta, &[("title", "Ann")]).unwrap(), false)
            .unwrap();
        assert_eq!(
            exact,
            json!({ "bool": { "filter": [
                { "term": { "title": { "value": "Ann", "case_insensitive": true } } },
            ] } })
        );

        let all = translator()
            .build_query_filter(&meta, &Filter::new(), true)
            .unwrap();
        assert_eq!(all, json!({ "match_all": {} }));
    }

    #[test]
    fn dates_are_sent_as_text() {
        let meta = meta();
        let filter = Filter::parse(&meta, &[("day", "lt:2024-03-01")]).unwrap();
        let query = translator().build_query_filter(&meta, &filter, true).unwrap();
        assert_eq!(
            query.pointer("/bool/filter/1/range/day/lt"),
            Some(&json!("2024-03-01"))
        );
    }

    #[test]
    fn sorts() {
        let meta = meta();
        let sort = translator()
            .build_sort_spec(&meta, &[SortField::desc("title"), SortField::asc("cost")])
            .unwrap();
        assert_eq!(sort[0]["_script"]["order"], json!("desc"));
        assert_eq!(sort[0]["_script"]["script"]["params"]["f"], json!("title"));
        assert_eq!(
            sort[1],
            json!({ "cost": { "order": "asc", "missing": "_first", "unmapped_type": "keyword" } })
        );

        let sensitive = ElasticTranslator {
            case_sensitive: true,
        };
        let sort = sensitive
            .build_sort_spec(&meta, &[SortField::desc("title")])
            .unwrap();
        assert_eq!(sort[0]["title"]["missing"], json!("_last"));
    }

    #[test]
    fn template_maps_strings_to_normalized_keywords() {
        let template = index_template("docs_event", &meta());
        assert_eq!(template["index_patterns"], json!(["docs_event"]));
        let properties = &template["template"]["mappings"]["properties"];
        assert_eq!(
            properties["title"],
            json!({ "type": "keyword", "normalizer": "lowercase_normalizer" })
        );
        assert_eq!(properties["cost"]["type"], json!("double"));
        assert_eq!(properties["day"]["type"], json!("date"));
        assert_eq!(properties["id"]["type"], json!("keyword"));
    }

    #[test]
    fn detects_legacy_mappings() {
        let mapping = json!({ "mappings": { "properties": {
            "title": { "type": "text", "fields": { "raw": { "type": "keyword" } } },
            "email": { "type": "keyword" },
        } } });
        assert_eq!(legacy_fields(&mapping), vec!["title".to_string()]);
        assert!(legacy_fields(&json!({})).is_empty());
    }

    #[test]
    fn source_round_trip() {
        let document = from_source("abc", &json!({ "id": "abc", "title": "x" })).unwrap();
        assert_eq!(document.first_key(), Some("_id"));
        assert_eq!(document.get("title"), Some(&Value::text("x")));
        assert!(document.get("id").is_none());
    }

    #[tokio::test]
    #[traced_test]
    #[ignore = "needs a running elasticsearch cluster"]
    pub async fn test_elastic() {
        let config = ElasticConfig {
            url: std::env::var("DOCTRACKS_ES_URL").unwrap_or("http://localhost:9200".to_string()),
            index_prefix: "doctracks_test_".to_string(),
            username: None,
            password: None,
            refresh: "true".to_string(),
            common: CommonOptions::default(),
        };
        let elastic = Elastic::connect(&config).await.unwrap();
        let meta = Arc::new(meta());
        elastic.delete_collection(&meta).await.unwrap();
        elastic.init(&[meta.clone()]).await.unwrap();

        let document = Document::from_pairs(vec![("email", Value::text("a@x.com"))]);
        elastic.create(&meta, "one", document.clone()).await.unwrap();
        assert!(elastic.create(&meta, "one", document).await.unwrap_err().is_duplicate());
        let candidate = vec![("email".to_string(), Value::text("A@X.com"))];
        // the normalizer makes the lookup ignore case
        assert!(
            elastic
                .document_exists_with_field_value(&meta, &candidate, None)
                .await
                .unwrap()
        );
        assert!(elastic.health(&[meta.clone()]).await.is_healthy());
        elastic.delete_collection(&meta).await.unwrap();
    }
}
