//! Statement generation shared by the relational drivers.

use crate::config::Layout;
use crate::driver::{QueryTranslator, list_match, sorts_case_insensitive};
use crate::unique::index_name;
use error::{StoreError, StoreResult};
use util::{Condition, EntityMeta, Filter, ID_FIELD, MatchKind, RangeOp, SortField};
use std::cmp::Ordering;
use tracing::warn;
use value::{Document, FieldType, PgType, StorageTraits, Value, to_storage};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// Where clause with its positional parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<Value>,
}

impl SqlFilter {
    fn where_clause(&self) -> String {
        if self.clause.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clause)
        }
    }
}

/// A statement ready to run.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

struct Params {
    dialect: Dialect,
    values: Vec<Value>,
}

impl Params {
    fn new(dialect: Dialect) -> Self {
        Params {
            dialect,
            values: vec![],
        }
    }

    fn push(&mut self, value: Value) -> String {
        let cast = value.pg_cast();
        self.push_as(value, cast)
    }

    fn push_as(&mut self, value: Value, cast: &str) -> String {
        self.values.push(value);
        match self.dialect {
            Dialect::Postgres => format!("${}::{}", self.values.len(), cast),
            Dialect::Sqlite => format!("?{}", self.values.len()),
        }
    }
}

/// Sqlite function lowering text with full unicode case mapping.
pub(crate) const SQLITE_LOWER: &str = "ulower";
/// Sqlite collation comparing unicode text regardless of case.
pub(crate) const SQLITE_NOCASE: &str = "UNICASE";

pub(crate) fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Escapes `%`, `_` and the escape character itself.
pub(crate) fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Clone, Debug)]
pub struct SqlBuilder {
    pub(crate) dialect: Dialect,
    pub(crate) layout: Layout,
    pub(crate) case_sensitive: bool,
    pub(crate) traits: StorageTraits,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect, layout: Layout, case_sensitive: bool) -> Self {
        let traits = match dialect {
            Dialect::Postgres => StorageTraits::JSON,
            Dialect::Sqlite => StorageTraits::TEXTUAL,
        };
        SqlBuilder {
            dialect,
            layout,
            case_sensitive,
            traits,
        }
    }

    pub fn table(&self, meta: &EntityMeta) -> String {
        quote(meta.collection())
    }

    fn column_type(&self, field_type: FieldType) -> &'static str {
        match (self.dialect, field_type) {
            (Dialect::Postgres, FieldType::Integer) => "BIGINT",
            (Dialect::Postgres, FieldType::Float | FieldType::Currency) => "DOUBLE PRECISION",
            (Dialect::Postgres, FieldType::Boolean) => "BOOLEAN",
            (Dialect::Postgres, FieldType::Json) => "JSONB",
            (Dialect::Postgres, _) => "TEXT",
            (Dialect::Sqlite, FieldType::Integer | FieldType::Boolean) => "INTEGER",
            (Dialect::Sqlite, FieldType::Float | FieldType::Currency) => "REAL",
            (Dialect::Sqlite, _) => "TEXT",
        }
    }

    /// Expression reading `field` with its declared type.
    pub fn field_expr(&self, meta: &EntityMeta, field: &str) -> String {
        if field == ID_FIELD {
            return "id".to_string();
        }
        let field_type = meta.field_type(field).unwrap_or(FieldType::String);
        match (self.layout, self.dialect) {
            (Layout::Columns, _) => quote(field),
            (Layout::Json, Dialect::Sqlite) => format!("json_extract(data, '$.{}')", field),
            // values of another json type read as missing instead of failing the cast
            (Layout::Json, Dialect::Postgres) => match field_type {
                FieldType::Integer | FieldType::Float | FieldType::Currency => format!(
                    "(CASE WHEN jsonb_typeof(data->'{0}') = 'number' THEN (data->>'{0}')::numeric END)",
                    field
                ),
                FieldType::Boolean => format!(
                    "(CASE WHEN jsonb_typeof(data->'{0}') = 'boolean' THEN (data->>'{0}')::boolean END)",
                    field
                ),
                FieldType::Json => format!("(data->'{}')", field),
                _ => format!("(data->>'{}')", field),
            },
        }
    }

    fn index_expr(&self, field: &str) -> String {
        match (self.layout, self.dialect) {
            (Layout::Columns, _) => quote(field),
            (Layout::Json, Dialect::Sqlite) => format!("json_extract(data, '$.{}')", field),
            (Layout::Json, Dialect::Postgres) => format!("(data->>'{}')", field),
        }
    }

    fn storage_value(&self, meta: &EntityMeta, field: &str, value: &Value) -> Value {
        if field == ID_FIELD {
            return value.clone();
        }
        let field_type = meta.field_type(field).unwrap_or(FieldType::String);
        to_storage(field_type, value.clone(), &self.traits)
    }

    fn pg_type(&self, meta: &EntityMeta, field: &str) -> PgType {
        if field == ID_FIELD {
            return PgType::Text;
        }
        PgType::of_field(meta.field_type(field).unwrap_or(FieldType::String))
    }

    /// Operand compared with `field` and the cast of its placeholder.
    /// Postgres binds it with the type of the field, `Err` hands back a
    /// value that has no representation there.
    fn fit_operand(&self, meta: &EntityMeta, field: &str, value: Value) -> Result<(Value, &'static str), Value> {
        match self.dialect {
            Dialect::Sqlite => {
                let cast = value.pg_cast();
                Ok((value, cast))
            }
            Dialect::Postgres => {
                let target = self.pg_type(meta, field);
                // fractions still compare with integer fields
                let fitted = value.fit_pg(target).map(|v| (v, target)).or_else(|| {
                    (target == PgType::BigInt)
                        .then(|| value.fit_pg(PgType::Double).map(|v| (v, PgType::Double)))
                        .flatten()
                });
                fitted.map(|(v, target)| (v, target.cast())).ok_or(value)
            }
        }
    }

    /// Ordering of every stored value of `field` against an operand of
    /// another kind, the same one the in-process comparison uses.
    fn kind_order(&self, meta: &EntityMeta, field: &str, operand: &Value) -> Ordering {
        let sample = match self.pg_type(meta, field) {
            PgType::BigInt => Value::int(0),
            PgType::Double => Value::float(0.0),
            PgType::Boolean => Value::bool(false),
            PgType::Jsonb | PgType::Text => Value::text(""),
        };
        sample.compare(operand, false)
    }

    fn condition(
        &self,
        meta: &EntityMeta,
        field: &str,
        condition: &Condition,
        kind: MatchKind,
        params: &mut Params,
    ) -> String {
        let expr = self.field_expr(meta, field);
        match condition {
            Condition::Eq(value) => {
                let value = self.storage_value(meta, field, value);
                if value.is_null() {
                    return format!("{} IS NULL", expr);
                }
                match kind {
                    MatchKind::Substring => {
                        let pattern =
                            Value::text(format!("%{}%", escape_like(&value.to_plain_string())));
                        match self.dialect {
                            Dialect::Postgres => format!("{} ILIKE {}", expr, params.push(pattern)),
                            Dialect::Sqlite => format!(
                                "{1}({0}) LIKE {1}({2}) ESCAPE '\\'",
                                expr,
                                SQLITE_LOWER,
                                params.push(pattern)
                            ),
                        }
                    }
                    MatchKind::ExactIgnoreCase => match self.fit_operand(meta, field, value) {
                        Ok((operand, cast)) => {
                            let operand = params.push_as(operand, cast);
                            match self.dialect {
                                Dialect::Postgres => format!("LOWER({}) = LOWER({})", expr, operand),
                                Dialect::Sqlite => {
                                    format!("{1}({0}) = {1}({2})", expr, SQLITE_LOWER, operand)
                                }
                            }
                        }
                        Err(_) => "FALSE".to_string(),
                    },
                    MatchKind::Exact => match self.fit_operand(meta, field, value) {
                        Ok((operand, cast)) => format!("{} = {}", expr, params.push_as(operand, cast)),
                        Err(_) => "FALSE".to_string(),
                    },
                }
            }
            Condition::Range(range) => {
                let mut bounds = vec![];
                for (op, bound) in range.bounds() {
                    let symbol = match op {
                        RangeOp::Gt => ">",
                        RangeOp::Gte => ">=",
                        RangeOp::Lt => "<",
                        RangeOp::Lte => "<=",
                    };
                    let bound = self.storage_value(meta, field, bound);
                    match self.fit_operand(meta, field, bound) {
                        Ok(operand) => bounds.push((symbol, operand)),
                        Err(bound) => {
                            let holds = match (op, self.kind_order(meta, field, &bound)) {
                                (RangeOp::Gt | RangeOp::Gte, Ordering::Greater) => true,
                                (RangeOp::Lt | RangeOp::Lte, Ordering::Less) => true,
                                _ => false,
                            };
                            if !holds {
                                return "FALSE".to_string();
                            }
                        }
                    }
                }
                let mut parts = vec![format!("{} IS NOT NULL", expr)];
                for (symbol, (operand, cast)) in bounds {
                    parts.push(format!("{} {} {}", expr, symbol, params.push_as(operand, cast)));
                }
                format!("({})", parts.join(" AND "))
            }
        }
    }

    fn filter_with(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        kind_of: impl Fn(&str) -> MatchKind,
        params: &mut Params,
    ) -> String {
        filter
            .iter()
            .map(|(field, condition)| self.condition(meta, field, condition, kind_of(field), params))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn columns(&self, meta: &EntityMeta) -> String {
        match self.layout {
            Layout::Json => "id, data".to_string(),
            Layout::Columns => std::iter::once("id".to_string())
                .chain(meta.fields().keys().map(|f| quote(f)))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    pub fn create_table(&self, meta: &EntityMeta) -> String {
        let table = self.table(meta);
        match self.layout {
            Layout::Json => {
                let data = match self.dialect {
                    Dialect::Postgres => "JSONB",
                    Dialect::Sqlite => "TEXT",
                };
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, data {} NOT NULL)",
                    table, data
                )
            }
            Layout::Columns => {
                let mut columns = vec!["id TEXT PRIMARY KEY".to_string()];
                for (name, field) in meta.fields() {
                    columns.push(format!(
                        "{} {}",
                        quote(name),
                        self.column_type(field.field_type)
                    ));
                }
                for group in meta.unique_groups() {
                    columns.push(format!(
                        "CONSTRAINT {} UNIQUE ({})",
                        quote(&index_name(meta.collection(), group)),
                        group.iter().map(|f| quote(f)).collect::<Vec<_>>().join(", ")
                    ));
                }
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    table,
                    columns.join(", ")
                )
            }
        }
    }

    /// Unique expression indexes of the JSON layout, the column layout
    /// declares its constraints inline.
    pub fn unique_indexes(&self, meta: &EntityMeta) -> Vec<String> {
        if self.layout == Layout::Columns {
            return vec![];
        }
        meta.unique_groups()
            .iter()
            .map(|group| {
                let expressions = group
                    .iter()
                    .map(|f| format!("({})", self.index_expr(f)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote(&index_name(meta.collection(), group)),
                    self.table(meta),
                    expressions
                )
            })
            .collect()
    }

    pub fn drop_table(&self, meta: &EntityMeta) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table(meta))
    }

    pub fn table_exists(&self, meta: &EntityMeta) -> Statement {
        let mut params = Params::new(self.dialect);
        let name = params.push(Value::text(meta.collection()));
        let sql = match self.dialect {
            Dialect::Postgres => format!(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = {}",
                name
            ),
            Dialect::Sqlite => format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = {}",
                name
            ),
        };
        Statement {
            sql,
            params: params.values,
        }
    }

    pub fn select_by_id(&self, meta: &EntityMeta, id: &str) -> Statement {
        let mut params = Params::new(self.dialect);
        let sql = format!(
            "SELECT {} FROM {} WHERE id = {}",
            self.columns(meta),
            self.table(meta),
            params.push(Value::text(id))
        );
        Statement {
            sql,
            params: params.values,
        }
    }

    /// Placeholders of the document values in column order. A postgres
    /// column keeps NULL for a value its type cannot hold, sqlite stores
    /// any value in any column.
    fn column_values(&self, meta: &EntityMeta, document: &Document, params: &mut Params) -> Vec<String> {
        meta.fields()
            .iter()
            .map(|(name, field)| {
                let value = document.get(name).cloned().unwrap_or(Value::Null);
                let target = PgType::of_field(field.field_type);
                let value = match self.dialect {
                    Dialect::Sqlite => value,
                    Dialect::Postgres => value.fit_pg(target).unwrap_or_else(|| {
                        warn!(
                            "{}.{}: {} '{}' does not fit a {} column, stored as NULL",
                            meta.name(),
                            name,
                            value.type_name(),
                            value,
                            target.cast()
                        );
                        Value::Null
                    }),
                };
                params.push_as(value, target.cast())
            })
            .collect()
    }

    fn data_value(&self, document: Document) -> Value {
        Value::dict(document)
    }

    pub fn insert(&self, meta: &EntityMeta, id: &str, document: Document) -> Statement {
        let mut params = Params::new(self.dialect);
        let id = params.push(Value::text(id));
        let sql = match self.layout {
            Layout::Json => {
                let data = params.push_as(self.data_value(document), "jsonb");
                format!(
                    "INSERT INTO {} (id, data) VALUES ({}, {}) RETURNING {}",
                    self.table(meta),
                    id,
                    data,
                    self.columns(meta)
                )
            }
            Layout::Columns => {
                let values = self.column_values(meta, &document, &mut params);
                format!(
                    "INSERT INTO {} ({}) VALUES ({}, {}) RETURNING {}",
                    self.table(meta),
                    self.columns(meta),
                    id,
                    values.join(", "),
                    self.columns(meta)
                )
            }
        };
        Statement {
            sql,
            params: params.values,
        }
    }

    pub fn update(&self, meta: &EntityMeta, id: &str, document: Document) -> Statement {
        let mut params = Params::new(self.dialect);
        let id = params.push(Value::text(id));
        let assignments = match self.layout {
            Layout::Json => format!("data = {}", params.push_as(self.data_value(document), "jsonb")),
            Layout::Columns => {
                let values = self.column_values(meta, &document, &mut params);
                meta.fields()
                    .keys()
                    .zip(values)
                    .map(|(name, value)| format!("{} = {}", quote(name), value))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        };
        Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE id = {} RETURNING {}",
                self.table(meta),
                assignments,
                id,
                self.columns(meta)
            ),
            params: params.values,
        }
    }

    pub fn delete(&self, meta: &EntityMeta, id: &str) -> Statement {
        let mut params = Params::new(self.dialect);
        let sql = format!(
            "DELETE FROM {} WHERE id = {} RETURNING {}",
            self.table(meta),
            params.push(Value::text(id)),
            self.columns(meta)
        );
        Statement {
            sql,
            params: params.values,
        }
    }

    /// Page query and count query sharing one filter.
    pub fn list(
        &self,
        meta: &EntityMeta,
        filter: &SqlFilter,
        order: &str,
        offset: u64,
        limit: u64,
    ) -> (Statement, Statement) {
        let where_clause = filter.where_clause();
        let page = format!(
            "SELECT {} FROM {}{} {} LIMIT {} OFFSET {}",
            self.columns(meta),
            self.table(meta),
            where_clause,
            order,
            limit,
            offset
        );
        let count = format!("SELECT COUNT(*) FROM {}{}", self.table(meta), where_clause);
        (
            Statement {
                sql: page,
                params: filter.params.clone(),
            },
            Statement {
                sql: count,
                params: filter.params.clone(),
            },
        )
    }

    /// Probe for another document holding exactly `values`.
    pub fn exists(
        &self,
        meta: &EntityMeta,
        values: &[(String, Value)],
        exclude_id: Option<&str>,
    ) -> Statement {
        let mut params = Params::new(self.dialect);
        let filter = crate::driver::values_filter(values);
        let mut clause = self.filter_with(meta, &filter, crate::driver::exact_match, &mut params);
        if let Some(id) = exclude_id {
            let id = params.push(Value::text(id));
            if clause.is_empty() {
                clause = format!("id <> {}", id);
            } else {
                clause = format!("{} AND id <> {}", clause, id);
            }
        }
        let filter = SqlFilter {
            clause,
            params: vec![],
        };
        Statement {
            sql: format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM {}{} LIMIT 1) AS hit",
                self.table(meta),
                filter.where_clause()
            ),
            params: params.values,
        }
    }

    /// Document out of a row read with the column list of this layout.
    pub fn decode(&self, meta: &EntityMeta, row: Vec<Value>) -> StoreResult<Document> {
        let mut row = row.into_iter();
        let id = row.next().unwrap_or(Value::Null);
        let mut document = match self.layout {
            Layout::Json => match row.next() {
                Some(Value::Dict(data)) => data,
                Some(Value::Text(raw)) => Document::parse_json(&raw)
                    .map_err(|err| StoreError::backend_msg(format!("invalid data column: {}", err)))?,
                _ => Document::new(),
            },
            Layout::Columns => meta
                .fields()
                .keys()
                .cloned()
                .zip(row)
                .filter(|(_, value)| !value.is_null())
                .collect(),
        };
        document.insert_first(ID_FIELD, id);
        Ok(document)
    }
}

impl QueryTranslator for SqlBuilder {
    type Filter = SqlFilter;
    type Sort = String;

    fn build_query_filter(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        substring_match: bool,
    ) -> StoreResult<SqlFilter> {
        let mut params = Params::new(self.dialect);
        let clause = self.filter_with(meta, filter, list_match(meta, substring_match), &mut params);
        Ok(SqlFilter {
            clause,
            params: params.values,
        })
    }

    fn build_sort_spec(&self, meta: &EntityMeta, sort: &[SortField]) -> StoreResult<String> {
        let parts = sort
            .iter()
            .map(|spec| {
                let mut expr = self.field_expr(meta, &spec.field);
                if sorts_case_insensitive(meta, &spec.field, self.case_sensitive) {
                    expr = match self.dialect {
                        Dialect::Postgres => format!("LOWER({})", expr),
                        Dialect::Sqlite => format!("{} COLLATE {}", expr, SQLITE_NOCASE),
                    };
                }
                // missing values sort as the smallest on every backend
                let direction = match (self.dialect, spec.direction.is_desc()) {
                    (Dialect::Postgres, false) => "ASC NULLS FIRST",
                    (Dialect::Postgres, true) => "DESC NULLS LAST",
                    (Dialect::Sqlite, false) => "ASC",
                    (Dialect::Sqlite, true) => "DESC",
                };
                format!("{} {}", expr, direction)
            })
            .collect::<Vec<_>>();
        if parts.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}
