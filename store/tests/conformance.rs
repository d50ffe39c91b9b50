//! Behaviour every driver has to share, run against each backend available
//! without an external server.

mod common;

use common::*;
use error::{StoreError, WarningKind};
use store::DocumentManager;
use util::{Filter, ListParams, SortField, ViewSpec};
use value::Value;

fn filter(pairs: &[(&str, &str)]) -> Filter {
    Filter::parse_tokens(pairs).unwrap()
}

async fn names(manager: &DocumentManager, params: ListParams) -> Vec<String> {
    manager
        .list("User", &params)
        .await
        .unwrap()
        .documents
        .iter()
        .map(|d| text_of(d, "firstName"))
        .collect()
}

async fn create_then_get(manager: DocumentManager) {
    let saved = manager
        .create("user", user("Annette", "a@x.com", 31))
        .await
        .unwrap();
    assert_eq!(saved.count, 1);
    let id = id_of(&saved.document);
    assert_eq!(id.len(), 26);
    assert_eq!(id, id.to_lowercase());
    assert_eq!(saved.document.first_key(), Some("id"));
    assert!(saved.document.get("_id").is_none());
    assert_eq!(saved.document.get("firstName"), Some(&Value::text("Annette")));
    assert_eq!(saved.document.get("age"), Some(&Value::int(31)));
    assert!(matches!(saved.document.get("createdAt"), Some(Value::Time(_))));
    assert!(matches!(saved.document.get("updatedAt"), Some(Value::Time(_))));

    let fetched = manager
        .get_by_id("USER", &id.to_uppercase(), &ViewSpec::new(), true)
        .await
        .unwrap();
    assert_eq!(fetched.count, 1);
    assert_eq!(fetched.document, Some(saved.document));

    let custom = manager
        .create(
            "User",
            doc(vec![("ID", Value::text("Custom-1")), ("firstName", Value::text("Cid"))]),
        )
        .await
        .unwrap();
    assert_eq!(id_of(&custom.document), "custom-1");
}

async fn duplicates_fail_once(manager: DocumentManager) {
    let first = manager.create("User", user("Ann", "a@x.com", 20)).await.unwrap();
    assert_eq!(first.count, 1);

    match manager.create("User", user("Bob", "a@x.com", 21)).await {
        Err(StoreError::DuplicateConstraint {
            entity,
            fields,
            value,
        }) => {
            assert_eq!(entity, "User");
            assert_eq!(fields, vec!["email"]);
            assert_eq!(value, "a@x.com");
        }
        other => panic!("unexpected {:?}", other),
    }

    let same_id = doc(vec![
        ("id", first.document.get("id").cloned().unwrap()),
        ("firstName", Value::text("Cid")),
    ]);
    let err = manager.create("User", same_id).await.unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(err.status(), 409);

    // unset members of a group never collide
    manager
        .create("User", doc(vec![("firstName", Value::text("Dee"))]))
        .await
        .unwrap();
    manager
        .create("User", doc(vec![("firstName", Value::text("Eve"))]))
        .await
        .unwrap();
}

/// Filters match text case-insensitively, unique writes compare stored
/// values as they are on these backends.
async fn uniqueness_is_case_sensitive(manager: DocumentManager) {
    manager.create("User", user("Ann", "a@x.com", 20)).await.unwrap();
    manager.create("User", user("Bob", "A@X.COM", 21)).await.unwrap();

    let found = manager
        .list("User", &ListParams::new().filter(filter(&[("email", "A@x.Com")])))
        .await
        .unwrap();
    assert_eq!(found.total, 2);
}

async fn delete_is_idempotent(manager: DocumentManager) {
    let missing = manager.delete("User", "nothing-here").await.unwrap();
    assert_eq!(missing.count, 0);
    assert!(missing.document.is_none());

    let saved = manager.create("User", user("Ann", "a@x.com", 20)).await.unwrap();
    let id = id_of(&saved.document);
    let deleted = manager.delete("User", &id).await.unwrap();
    assert_eq!(deleted.count, 1);
    assert_eq!(deleted.document.map(|d| id_of(&d)), Some(id.clone()));

    let again = manager.delete("User", &id).await.unwrap();
    assert_eq!(again.count, 0);

    let err = manager
        .get_by_id("User", &id, &ViewSpec::new(), true)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let nested = manager
        .get_by_id("User", &id, &ViewSpec::new(), false)
        .await
        .unwrap();
    assert_eq!(nested.count, 0);
    assert!(nested.document.is_none());
}

async fn filters_follow_metadata(manager: DocumentManager) {
    for (first, email, age, role) in [
        ("Annette", "a@x.com", 31, Some("admin")),
        ("Joanna", "j@x.com", 25, Some("member")),
        ("Bob", "b@x.com", 40, None),
    ] {
        let mut user = user(first, email, age);
        if let Some(role) = role {
            user.insert("role", role);
        }
        manager.create("User", user).await.unwrap();
    }
    let by_name = || vec![SortField::asc("firstName")];

    let params = ListParams::new().filter(filter(&[("firstname", "ANN")])).sort(by_name());
    assert_eq!(names(&manager, params).await, vec!["Annette", "Joanna"]);

    // enum values only match whole
    let params = ListParams::new().filter(filter(&[("role", "adm")]));
    assert!(names(&manager, params).await.is_empty());
    let params = ListParams::new().filter(filter(&[("role", "admin")]));
    assert_eq!(names(&manager, params).await, vec!["Annette"]);

    let params = ListParams::new().filter(filter(&[("firstName", "ann")])).exact();
    assert!(names(&manager, params).await.is_empty());
    let params = ListParams::new().filter(filter(&[("firstName", "annette")])).exact();
    assert_eq!(names(&manager, params).await, vec!["Annette"]);

    let params = ListParams::new()
        .filter(filter(&[("age", "gt:30")]))
        .sort(vec![SortField::desc("age")]);
    assert_eq!(names(&manager, params).await, vec!["Bob", "Annette"]);

    let params = ListParams::new().filter(filter(&[("age", "gte:25"), ("age", "lt:40")])).sort(by_name());
    assert_eq!(names(&manager, params).await, vec!["Annette", "Joanna"]);

    let err = manager
        .list("User", &ListParams::new().filter(filter(&[("nickname", "x")])))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
    let err = manager
        .list("User", &ListParams::new().sort(vec![SortField::asc("nickname")]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
}

async fn unicode_text_ignores_case(manager: DocumentManager) {
    for (first, email) in [("Özil", "o@x.com"), ("Ärger", "a@x.com"), ("öde", "d@x.com")] {
        manager.create("User", user(first, email, 1)).await.unwrap();
    }
    let params = ListParams::new().filter(filter(&[("firstName", "äR")]));
    assert_eq!(names(&manager, params).await, vec!["Ärger"]);
    let params = ListParams::new().filter(filter(&[("firstName", "ÄRGER")])).exact();
    assert_eq!(names(&manager, params).await, vec!["Ärger"]);

    let params = ListParams::new().sort(vec![SortField::asc("firstName")]);
    assert_eq!(names(&manager, params).await, vec!["Ärger", "öde", "Özil"]);
}

/// Values that do not convert to the declared type are written anyway and
/// only reported.
async fn mismatched_values_are_advisory(manager: DocumentManager) {
    manager.create("User", user("Ann", "a@x.com", 20)).await.unwrap();
    for (first, email, age) in [("Bob", "b@x.com", Value::float(1.5)), ("Cid", "c@x.com", Value::text("many"))] {
        let saved = manager
            .create(
                "User",
                doc(vec![
                    ("firstName", Value::text(first)),
                    ("email", Value::text(email)),
                    ("age", age),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(saved.count, 1);
        assert!(
            saved
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::Validation && w.field.as_deref() == Some("age"))
        );
    }

    let params = ListParams::new()
        .filter(filter(&[("age", "gte:1.2"), ("age", "lt:30")]))
        .sort(vec![SortField::asc("firstName")]);
    assert_eq!(names(&manager, params).await, vec!["Ann", "Bob"]);
    let params = ListParams::new().filter(filter(&[("age", "1.5")]));
    assert_eq!(names(&manager, params).await, vec!["Bob"]);
}

async fn references_filter_like_ids(manager: DocumentManager) {
    let owner = manager.create("User", user("Ann", "a@x.com", 20)).await.unwrap();
    let owner = id_of(&owner.document);
    manager
        .create(
            "Event",
            doc(vec![("title", Value::text("launch")), ("userId", Value::text(owner.to_uppercase()))]),
        )
        .await
        .unwrap();

    let upper = owner.to_uppercase();
    let found = manager
        .list("Event", &ListParams::new().filter(filter(&[("userId", upper.as_str())])))
        .await
        .unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(text_of(&found.documents[0], "userId"), owner);
}

async fn declared_keys_keep_their_data(manager: DocumentManager) {
    let owner = manager.create("User", user("Annette", "a@x.com", 31)).await.unwrap();
    let owner = id_of(&owner.document);
    let saved = manager
        .create(
            "Ticket",
            doc(vec![("user", Value::text("front desk")), ("userId", Value::text(&owner))]),
        )
        .await
        .unwrap();
    assert_eq!(saved.document.get("user"), Some(&Value::text("front desk")));

    let view = ViewSpec::parse("userId_ref:firstName").unwrap();
    let fetched = manager
        .get_by_id("Ticket", &id_of(&saved.document), &view, true)
        .await
        .unwrap()
        .document
        .unwrap();
    assert_eq!(fetched.get("user"), Some(&Value::text("front desk")));
    let expanded = fetched.get("userId_ref").and_then(|u| u.as_dict()).unwrap();
    assert_eq!(expanded.get("exists"), Some(&Value::bool(true)));
    assert_eq!(expanded.get("firstName"), Some(&Value::text("Annette")));

    let listed = manager.list("Ticket", &ListParams::new()).await.unwrap();
    assert_eq!(listed.documents[0].get("user"), Some(&Value::text("front desk")));
}

async fn text_sorts_ignore_case(manager: DocumentManager) {
    for (first, email) in [("bob", "b@x.com"), ("Anna", "a@x.com"), ("carl", "c@x.com")] {
        manager.create("User", user(first, email, 1)).await.unwrap();
    }
    let params = ListParams::new().sort(vec![SortField::asc("firstName")]);
    assert_eq!(names(&manager, params).await, vec!["Anna", "bob", "carl"]);
}

async fn ranges_skip_missing_fields(manager: DocumentManager) {
    let owner = manager.create("User", user("Ann", "a@x.com", 20)).await.unwrap();
    let owner = id_of(&owner.document);
    for (title, cost) in [("free", Some(0.0)), ("paid", Some(12.5)), ("tbd", None)] {
        let mut event = doc(vec![
            ("title", Value::text(title)),
            ("userId", Value::text(&owner)),
        ]);
        if let Some(cost) = cost {
            event.insert("cost", cost);
        }
        manager.create("Event", event).await.unwrap();
    }

    let titles = |params: ListParams| {
        let manager = manager.clone();
        async move {
            let mut titles: Vec<String> = manager
                .list("Event", &params)
                .await
                .unwrap()
                .documents
                .iter()
                .map(|d| text_of(d, "title"))
                .collect();
            titles.sort();
            titles
        }
    };
    assert_eq!(
        titles(ListParams::new().filter(filter(&[("cost", "gte:0")]))).await,
        vec!["free", "paid"]
    );
    assert_eq!(
        titles(ListParams::new().filter(filter(&[("cost", "lt:10")]))).await,
        vec!["free"]
    );
}

async fn default_sort_and_pages(manager: DocumentManager) {
    for index in 0..5 {
        manager
            .create("User", user(&format!("user{}", index), &format!("{}@x.com", index), index))
            .await
            .unwrap();
    }
    let ids = |params: ListParams| {
        let manager = manager.clone();
        async move {
            manager
                .list("User", &params)
                .await
                .unwrap()
                .documents
                .iter()
                .map(id_of)
                .collect::<Vec<_>>()
        }
    };
    let default = ids(ListParams::new()).await;
    let explicit = ids(ListParams::new().sort(vec![SortField::asc("createdAt")])).await;
    assert_eq!(default.len(), 5);
    assert_eq!(default, explicit);

    let second = manager
        .list("User", &ListParams::new().page(2, 2))
        .await
        .unwrap();
    assert_eq!(second.total, 5);
    assert_eq!(second.documents.iter().map(id_of).collect::<Vec<_>>(), default[2..4]);
    let last = manager
        .list("User", &ListParams::new().page(3, 2))
        .await
        .unwrap();
    assert_eq!(last.documents.len(), 1);
    let beyond = manager
        .list("User", &ListParams::new().page(4, 2))
        .await
        .unwrap();
    assert!(beyond.documents.is_empty());
    assert_eq!(beyond.total, 5);

    let err = manager
        .list("User", &ListParams::new().page(0, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
}

async fn references_resolve(manager: DocumentManager) {
    let owner = manager.create("User", user("Annette", "a@x.com", 31)).await.unwrap();
    let owner = id_of(&owner.document);

    let err = manager
        .create(
            "Event",
            doc(vec![("title", Value::text("orphan")), ("userId", Value::text("nobody"))]),
        )
        .await
        .unwrap_err();
    match err {
        StoreError::UnprocessableEntity { field, .. } => assert_eq!(field, "userId"),
        other => panic!("unexpected {:?}", other),
    }

    let saved = manager
        .create(
            "Event",
            doc(vec![
                ("title", Value::text("launch")),
                ("userId", Value::text(owner.to_uppercase())),
                ("hostId", Value::text("gone")),
                ("venueId", Value::text("v1")),
                ("user", Value::text("placeholder")),
            ]),
        )
        .await
        .unwrap();
    assert!(saved.document.get("user").is_none());
    assert_eq!(saved.document.get("userId"), Some(&Value::text(&owner)));
    let integrity: Vec<_> = saved
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::DataIntegrity)
        .filter_map(|w| w.field.clone())
        .collect();
    assert_eq!(integrity, vec!["hostId", "venueId"]);

    let view = ViewSpec::parse("user:firstName,age;host:firstName").unwrap();
    let fetched = manager
        .get_by_id("Event", &id_of(&saved.document), &view, true)
        .await
        .unwrap()
        .document
        .unwrap();
    let expanded = fetched.get("user").and_then(|u| u.as_dict()).unwrap();
    assert_eq!(expanded.get("exists"), Some(&Value::bool(true)));
    assert_eq!(expanded.get("firstName"), Some(&Value::text("Annette")));
    assert_eq!(expanded.get("age"), Some(&Value::int(31)));
    let host = fetched.get("host").and_then(|h| h.as_dict()).unwrap();
    assert_eq!(host.get("exists"), Some(&Value::bool(false)));
    assert_eq!(host.len(), 1);
}

async fn updates_merge(manager: DocumentManager) {
    let saved = manager.create("User", user("Ann", "a@x.com", 20)).await.unwrap();
    let id = id_of(&saved.document);
    manager.create("User", user("Bob", "b@x.com", 21)).await.unwrap();

    let updated = manager
        .update(
            "User",
            &id,
            doc(vec![("lastName", Value::text("Smith")), ("id", Value::text("other"))]),
        )
        .await
        .unwrap();
    assert_eq!(updated.count, 1);
    assert_eq!(id_of(&updated.document), id);
    assert_eq!(updated.document.get("firstName"), Some(&Value::text("Ann")));
    assert_eq!(updated.document.get("lastName"), Some(&Value::text("Smith")));
    assert_eq!(updated.document.get("createdAt"), saved.document.get("createdAt"));

    // own values do not collide with themselves
    manager
        .update("User", &id, doc(vec![("email", Value::text("a@x.com"))]))
        .await
        .unwrap();

    let err = manager
        .update("User", &id, doc(vec![("email", Value::text("b@x.com"))]))
        .await
        .unwrap_err();
    assert!(err.is_duplicate());

    let err = manager
        .update("User", "missing", doc(vec![("age", Value::int(1))]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

async fn validation_is_advisory(manager: DocumentManager) {
    let saved = manager
        .create(
            "User",
            doc(vec![("email", Value::text("a@x.com")), ("role", Value::text("owner"))]),
        )
        .await
        .unwrap();
    let fields: Vec<_> = saved
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::Validation)
        .filter_map(|w| w.field.clone())
        .collect();
    assert_eq!(fields, vec!["firstName", "role"]);

    let listed = manager.list("User", &ListParams::new()).await.unwrap();
    assert_eq!(listed.documents.len(), 1);
    assert_eq!(listed.warnings.len(), 2);
}

macro_rules! conformance {
    ($backend:ident, $config:expr) => {
        mod $backend {
            use super::*;
            use tracing_test::traced_test;

            async fn manager() -> DocumentManager {
                common::manager($config).await.0
            }

            #[tokio::test]
            #[traced_test]
            async fn create_then_get() {
                super::create_then_get(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn duplicates_fail_once() {
                super::duplicates_fail_once(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn uniqueness_is_case_sensitive() {
                super::uniqueness_is_case_sensitive(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn delete_is_idempotent() {
                super::delete_is_idempotent(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn filters_follow_metadata() {
                super::filters_follow_metadata(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn text_sorts_ignore_case() {
                super::text_sorts_ignore_case(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn ranges_skip_missing_fields() {
                super::ranges_skip_missing_fields(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn default_sort_and_pages() {
                super::default_sort_and_pages(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn references_resolve() {
                super::references_resolve(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn updates_merge() {
                super::updates_merge(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn validation_is_advisory() {
                super::validation_is_advisory(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn unicode_text_ignores_case() {
                super::unicode_text_ignores_case(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn mismatched_values_are_advisory() {
                super::mismatched_values_are_advisory(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn references_filter_like_ids() {
                super::references_filter_like_ids(manager().await).await;
            }

            #[tokio::test]
            #[traced_test]
            async fn declared_keys_keep_their_data() {
                super::declared_keys_keep_their_data(manager().await).await;
            }
        }
    };
}

conformance!(memory, common::memory());
conformance!(sqlite_json, common::sqlite(engine::Layout::Json));
conformance!(sqlite_columns, common::sqlite(engine::Layout::Columns));
