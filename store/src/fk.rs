//! Foreign key resolution shared by validation on writes and view expansion on reads.

use engine::{Driver, ListQuery};
use error::{StoreError, StoreResult, Warning};
use util::{EntityMeta, Filter, ID_FIELD, MetadataProvider, Reference, SortField, ViewSpec};
use value::{Document, Value};

use crate::normalize;

/// What a resolution pass is for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum FkMode {
    /// writes: required references have to exist
    Validate,
    /// reads: attach `{exists, ...projection}` next to every reference
    Expand,
}

pub(crate) struct FkResolver<'a> {
    pub(crate) driver: &'a dyn Driver,
    pub(crate) metadata: &'a dyn MetadataProvider,
}

impl FkResolver<'_> {
    /// Referenced document, looked up by id without validating it. More than
    /// one match is reported, the first one is used.
    async fn fetch(
        &self,
        meta: &EntityMeta,
        target: &EntityMeta,
        id: &str,
        warnings: &mut Vec<Warning>,
    ) -> StoreResult<Option<Document>> {
        let query = ListQuery {
            filter: Filter::new().eq(ID_FIELD, Value::text(id)),
            sort: vec![SortField::asc(ID_FIELD)],
            offset: 0,
            limit: 2,
            substring_match: false,
        };
        let (documents, total) = self.driver.get_list(target, &query).await?;
        if total > 1 {
            warnings.push(Warning::integrity(
                meta.name(),
                format!("{} documents of {} share the id '{}'", total, target.name(), id),
            ));
        }
        Ok(documents
            .into_iter()
            .next()
            .map(|d| normalize::response(target, self.driver.id_field(), d)))
    }

    fn expansion(reference: &Reference, meta: &EntityMeta, found: &Document, view: &ViewSpec) -> Value {
        let mut expanded = Document::from_pairs(vec![("exists", Value::bool(true))]);
        if let Some(fields) = view.projection(&reference.key) {
            for token in fields {
                let field = meta.resolve_field(token).unwrap_or(token.as_str());
                if let Some(value) = found.get(field) {
                    expanded.insert(field, value.clone());
                }
            }
        }
        Value::dict(expanded)
    }

    /// Resolves every populated reference of `document`.
    ///
    /// Unknown target entities and dangling optional references become
    /// integrity warnings, a dangling required reference fails validation.
    pub(crate) async fn process(
        &self,
        meta: &EntityMeta,
        document: &mut Document,
        view: &ViewSpec,
        mode: FkMode,
    ) -> StoreResult<Vec<Warning>> {
        let mut warnings = vec![];
        let id = document
            .get(ID_FIELD)
            .and_then(|id| id.as_str())
            .map(|id| id.to_string());
        let warn = |warning: Warning, warnings: &mut Vec<Warning>| {
            let warning = match &id {
                Some(id) => warning.with_id(id),
                None => warning,
            };
            warnings.push(warning);
        };

        for reference in meta.references() {
            let reference_id = match document.get(&reference.field) {
                Some(value) if !value.is_null() => value.to_plain_string(),
                _ => continue,
            };
            if reference_id.trim().is_empty() {
                continue;
            }

            let Some(target) = self.metadata.entity(&reference.target) else {
                warn(
                    Warning::integrity(
                        meta.name(),
                        format!("reference target '{}' is not a known entity", reference.target),
                    )
                    .with_field(&reference.field),
                    &mut warnings,
                );
                continue;
            };

            let found = self
                .fetch(meta, &target, &reference_id.to_lowercase(), &mut warnings)
                .await?;
            match (found, mode) {
                (Some(_), FkMode::Validate) => {}
                (Some(found), FkMode::Expand) => {
                    document.insert(reference.key.clone(), Self::expansion(&reference, &target, &found, view));
                }
                (None, FkMode::Validate) if reference.required => {
                    return Err(StoreError::unprocessable(
                        meta.name(),
                        &reference.field,
                        format!("references missing {} '{}'", target.name(), reference_id),
                    ));
                }
                (None, mode) => {
                    warn(
                        Warning::integrity(
                            meta.name(),
                            format!("references missing {} '{}'", target.name(), reference_id),
                        )
                        .with_field(&reference.field),
                        &mut warnings,
                    );
                    if mode == FkMode::Expand {
                        document.insert(
                            reference.key.clone(),
                            Value::dict(Document::from_pairs(vec![("exists", Value::bool(false))])),
                        );
                    }
                }
            }
        }
        Ok(warnings)
    }
}
