use crate::definition::{EntityMeta, ID_FIELD};
use crate::id::normalize_id;
use error::{StoreError, StoreResult};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use value::{FieldType, Value, coerce, coerce_str};

pub const DEFAULT_PAGE_SIZE: u64 = 25;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FromStr for RangeOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gt" => Ok(RangeOp::Gt),
            "gte" | "ge" => Ok(RangeOp::Gte),
            "lt" => Ok(RangeOp::Lt),
            "lte" | "le" => Ok(RangeOp::Lte),
            other => Err(format!("unknown range operator '{}'", other)),
        }
    }
}

impl Display for RangeOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
        })
    }
}

/// Bounds of a range condition, unset bounds are open.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Range {
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

impl Range {
    pub fn set(&mut self, op: RangeOp, value: Value) {
        let slot = match op {
            RangeOp::Gt => &mut self.gt,
            RangeOp::Gte => &mut self.gte,
            RangeOp::Lt => &mut self.lt,
            RangeOp::Lte => &mut self.lte,
        };
        *slot = Some(value);
    }

    /// Set bounds in a fixed order.
    pub fn bounds(&self) -> Vec<(RangeOp, &Value)> {
        [
            (RangeOp::Gt, &self.gt),
            (RangeOp::Gte, &self.gte),
            (RangeOp::Lt, &self.lt),
            (RangeOp::Lte, &self.lte),
        ]
        .into_iter()
        .filter_map(|(op, v)| v.as_ref().map(|v| (op, v)))
        .collect()
    }

    fn map(self, f: impl Fn(Value) -> Value) -> Range {
        Range {
            gt: self.gt.map(&f),
            gte: self.gte.map(&f),
            lt: self.lt.map(&f),
            lte: self.lte.map(&f),
        }
    }

    /// Whether `value` lies within the bounds, missing values never do.
    pub fn contains(&self, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        self.bounds().into_iter().all(|(op, bound)| {
            let ordering = value.compare(bound, false);
            match op {
                RangeOp::Gt => ordering.is_gt(),
                RangeOp::Gte => ordering.is_ge(),
                RangeOp::Lt => ordering.is_lt(),
                RangeOp::Lte => ordering.is_le(),
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(Value),
    Range(Range),
}

/// Field to condition mapping, conditions are combined with AND.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: IndexMap<String, Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn eq<S: AsRef<str>, V: Into<Value>>(mut self, field: S, value: V) -> Self {
        self.conditions
            .insert(field.as_ref().to_string(), Condition::Eq(value.into()));
        self
    }

    /// Range operators on the same field merge into one condition.
    pub fn range<S: AsRef<str>, V: Into<Value>>(mut self, field: S, op: RangeOp, value: V) -> Self {
        let field = field.as_ref().to_string();
        match self.conditions.get_mut(&field) {
            Some(Condition::Range(range)) => range.set(op, value.into()),
            _ => {
                let mut range = Range::default();
                range.set(op, value.into());
                self.conditions.insert(field, Condition::Range(range));
            }
        }
        self
    }

    /// Parses request pairs against the metadata of an entity, a value may
    /// carry an operator prefix: `gte:10`.
    pub fn parse<K: AsRef<str>, V: AsRef<str>>(
        meta: &EntityMeta,
        pairs: &[(K, V)],
    ) -> StoreResult<Self> {
        Self::parse_tokens(pairs)?.resolve(meta)
    }

    /// Parses request pairs without resolving field names.
    pub fn parse_tokens<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> StoreResult<Self> {
        let mut filter = Filter::new();
        for (field, raw) in pairs {
            let (field, raw) = (field.as_ref(), raw.as_ref());
            match raw.split_once(':') {
                Some((op, rest)) if op.parse::<RangeOp>().is_ok() => {
                    let op = op.parse::<RangeOp>().map_err(StoreError::invalid)?;
                    if matches!(filter.conditions.get(field), Some(Condition::Eq(_))) {
                        return Err(conflict(field));
                    }
                    filter = filter.range(field, op, rest);
                }
                Some(("eq", rest)) => filter = filter.eq_checked(field, rest)?,
                _ => filter = filter.eq_checked(field, raw)?,
            }
        }
        Ok(filter)
    }

    fn eq_checked(self, field: &str, raw: &str) -> StoreResult<Self> {
        if self.conditions.contains_key(field) {
            return Err(conflict(field));
        }
        Ok(self.eq(field, raw))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Condition)> {
        self.conditions.iter()
    }

    /// Canonical field names and values coerced to the declared types.
    pub fn resolve(self, meta: &EntityMeta) -> StoreResult<Filter> {
        let mut resolved = IndexMap::new();
        for (token, condition) in self.conditions {
            let field = meta.require_field(&token)?.to_string();
            let field_type = meta.field_type(&field).unwrap_or(FieldType::String);
            let condition = match condition {
                Condition::Eq(value) => Condition::Eq(resolve_value(&field, field_type, value)),
                Condition::Range(range) => {
                    if !field_type.is_ordered() {
                        return Err(StoreError::invalid(format!(
                            "range operators are not supported on {} field '{}'",
                            field_type, field
                        )));
                    }
                    Condition::Range(range.map(|v| resolve_value(&field, field_type, v)))
                }
            };
            if resolved.insert(field.clone(), condition).is_some() {
                return Err(conflict(&field));
            }
        }
        Ok(Filter {
            conditions: resolved,
        })
    }
}

/// References are stored normalized, so they are matched the same way ids are.
fn resolve_value(field: &str, field_type: FieldType, value: Value) -> Value {
    let resolved = match value {
        Value::Text(raw) if field == ID_FIELD || field_type == FieldType::ObjectId => {
            return Value::text(normalize_id(&raw));
        }
        Value::Text(raw) => coerce_str(field_type, &raw),
        other => coerce(field_type, other),
    };
    // `1.5` against an integer field still compares as a number
    if field_type.is_numeric()
        && let Value::Text(raw) = &resolved
        && let Some(number) = raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
    {
        return Value::float(number);
    }
    resolved
}

fn conflict(field: &str) -> StoreError {
    StoreError::invalid(format!("conflicting conditions on field '{}'", field))
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn is_desc(&self) -> bool {
        matches!(self, Direction::Desc)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortField {
    pub field: String,
    pub direction: Direction,
}

impl SortField {
    pub fn asc<S: AsRef<str>>(field: S) -> Self {
        SortField {
            field: field.as_ref().to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc<S: AsRef<str>>(field: S) -> Self {
        SortField {
            field: field.as_ref().to_string(),
            direction: Direction::Desc,
        }
    }

    /// Parses `name`, `-name`, `name:asc` and `name:desc`.
    pub fn parse(token: &str) -> StoreResult<Self> {
        let token = token.trim();
        if let Some(field) = token.strip_prefix('-') {
            return Ok(SortField::desc(field));
        }
        match token.split_once(':') {
            None => Ok(SortField::asc(token)),
            Some((field, direction)) => match direction.to_lowercase().as_str() {
                "asc" => Ok(SortField::asc(field)),
                "desc" => Ok(SortField::desc(field)),
                other => Err(StoreError::invalid(format!(
                    "unknown sort direction '{}'",
                    other
                ))),
            },
        }
    }

    /// Comma separated list of sort tokens.
    pub fn parse_list(raw: &str) -> StoreResult<Vec<SortField>> {
        raw.split(',')
            .filter(|t| !t.trim().is_empty())
            .map(SortField::parse)
            .collect()
    }
}

/// Resolves the requested order against the metadata: falls back to the
/// default sort field and always ends with the identifier as tiebreaker.
pub fn effective_sort(meta: &EntityMeta, sort: &[SortField]) -> StoreResult<Vec<SortField>> {
    let mut resolved: Vec<SortField> = vec![];
    for spec in sort {
        let field = meta.require_field(&spec.field)?;
        if resolved.iter().any(|s| s.field == field) {
            continue;
        }
        resolved.push(SortField {
            field: field.to_string(),
            direction: spec.direction,
        });
    }
    if resolved.is_empty() {
        resolved.push(SortField::asc(meta.default_sort_field()));
    }
    if !resolved.iter().any(|s| s.field == ID_FIELD) {
        resolved.push(SortField::asc(ID_FIELD));
    }
    Ok(resolved)
}

/// Fields projected per expanded reference, keyed by the reference's short name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewSpec {
    projections: HashMap<String, Vec<String>>,
}

impl ViewSpec {
    pub fn new() -> Self {
        ViewSpec::default()
    }

    pub fn with<S: AsRef<str>, F: AsRef<str>>(mut self, key: S, fields: &[F]) -> Self {
        self.projections.insert(
            key.as_ref().to_lowercase(),
            fields.iter().map(|f| f.as_ref().to_string()).collect(),
        );
        self
    }

    /// `user:firstName,lastName;org:name`
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let mut view = ViewSpec::new();
        for part in raw.split(';').filter(|p| !p.trim().is_empty()) {
            let Some((key, fields)) = part.split_once(':') else {
                return Err(StoreError::invalid(format!("invalid view '{}'", part)));
            };
            let fields: Vec<&str> = fields
                .split(',')
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .collect();
            view = view.with(key.trim(), &fields);
        }
        Ok(view)
    }

    pub fn projection(&self, key: &str) -> Option<&[String]> {
        self.projections.get(&key.to_lowercase()).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListParams {
    /// one based
    pub page: u64,
    pub page_size: u64,
    pub filter: Filter,
    pub sort: Vec<SortField>,
    pub view: ViewSpec,
    /// free text equality matches substrings, otherwise whole values
    pub substring_match: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        ListParams {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            filter: Filter::new(),
            sort: vec![],
            view: ViewSpec::new(),
            substring_match: true,
        }
    }
}

impl ListParams {
    pub fn new() -> Self {
        ListParams::default()
    }

    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn view(mut self, view: ViewSpec) -> Self {
        self.view = view;
        self
    }

    pub fn exact(mut self) -> Self {
        self.substring_match = false;
        self
    }

    pub fn check(&self) -> StoreResult<()> {
        if self.page == 0 || self.page_size == 0 {
            return Err(StoreError::invalid(format!(
                "page and page size have to be positive, got {} and {}",
                self.page, self.page_size
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        crate::pagination::offset(self.page, self.page_size)
    }
}
