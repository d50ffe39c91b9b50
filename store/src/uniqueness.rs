use engine::Driver;
use engine::unique::duplicate;
use error::StoreResult;
use tracing::debug;
use util::EntityMeta;
use value::{Document, Value};

/// Values of `group` in `document`, `None` if any member is unset.
fn group_values(group: &[String], document: &Document) -> Option<Vec<(String, Value)>> {
    group
        .iter()
        .map(|field| {
            document
                .get(field)
                .filter(|v| !v.is_null())
                .map(|v| (field.clone(), v.clone()))
        })
        .collect()
}

/// Application level uniqueness for drivers without native unique indexes.
///
/// Check and write are separate round trips, concurrent writers can both pass
/// the check before either writes.
pub(crate) async fn check_synthetic(
    driver: &dyn Driver,
    meta: &EntityMeta,
    id: &str,
    document: &Document,
    exclude_id: Option<&str>,
) -> StoreResult<()> {
    if driver.supports_native_indexes() {
        return Ok(());
    }
    for group in meta.unique_groups() {
        // unset members never collide
        let Some(values) = group_values(group, document) else {
            continue;
        };
        debug!("checking unique group {:?} of {}", group, meta.name());
        if driver
            .document_exists_with_field_value(meta, &values, exclude_id)
            .await?
        {
            return Err(duplicate(meta, group.clone(), id, document));
        }
    }
    Ok(())
}
