use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

/// Boxed source error, shareable so cloned errors keep their chain.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

pub type StoreResult<T> = Result<T, StoreError>;

/// The five logical operations of the document manager, plus schema work.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
    Schema,
}

impl Operation {
    /// Single letter code handed to the permission gate.
    pub fn code(&self) -> char {
        match self {
            Operation::List | Operation::Get => 'r',
            Operation::Create => 'c',
            Operation::Update => 'u',
            Operation::Delete => 'd',
            Operation::Schema => 's',
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::List => f.write_str("list"),
            Operation::Get => f.write_str("get"),
            Operation::Create => f.write_str("create"),
            Operation::Update => f.write_str("update"),
            Operation::Delete => f.write_str("delete"),
            Operation::Schema => f.write_str("schema"),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("{entity} with id '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("duplicate value '{value}' for unique field(s) [{}] of {entity}", .fields.join(", "))]
    DuplicateConstraint {
        entity: String,
        fields: Vec<String>,
        value: String,
    },

    #[error("unprocessable {entity}: field '{field}' {message}")]
    UnprocessableEntity {
        entity: String,
        field: String,
        message: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("operation '{operation}' on {entity} is not permitted")]
    PermissionDenied { entity: String, operation: char },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("database error during {operation} on {entity}: {source}")]
    Database {
        entity: String,
        operation: Operation,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn not_found<S1: AsRef<str>, S2: AsRef<str>>(entity: S1, id: S2) -> Self {
        StoreError::NotFound {
            entity: entity.as_ref().to_string(),
            id: id.as_ref().to_string(),
        }
    }

    pub fn duplicate<S: AsRef<str>>(entity: S, fields: Vec<String>, value: String) -> Self {
        StoreError::DuplicateConstraint {
            entity: entity.as_ref().to_string(),
            fields,
            value,
        }
    }

    pub fn unprocessable<S1: AsRef<str>, S2: AsRef<str>, S3: AsRef<str>>(
        entity: S1,
        field: S2,
        message: S3,
    ) -> Self {
        StoreError::UnprocessableEntity {
            entity: entity.as_ref().to_string(),
            field: field.as_ref().to_string(),
            message: message.as_ref().to_string(),
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        StoreError::InvalidRequest(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        StoreError::Config(message.into())
    }

    /// Wraps any native driver error, keeping it as source.
    pub fn backend<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        StoreError::Backend {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    pub fn backend_msg<S: Into<String>>(message: S) -> Self {
        StoreError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches entity and operation to untyped backend failures.
    ///
    /// Typed errors pass through unchanged so callers see one taxonomy
    /// regardless of the active driver.
    pub fn in_context<S: AsRef<str>>(self, entity: S, operation: Operation) -> Self {
        match self {
            err @ (StoreError::Backend { .. } | StoreError::Config(_)) => StoreError::Database {
                entity: entity.as_ref().to_string(),
                operation,
                source: Box::new(err),
            },
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateConstraint { .. })
    }

    /// Status code the http layer is expected to surface.
    pub fn status(&self) -> u16 {
        match self {
            StoreError::NotFound { .. } => 404,
            StoreError::DuplicateConstraint { .. } => 409,
            StoreError::UnprocessableEntity { .. } => 422,
            StoreError::InvalidRequest(_) => 400,
            StoreError::PermissionDenied { .. } => 403,
            StoreError::Config(_) | StoreError::Backend { .. } | StoreError::Database { .. } => 500,
        }
    }
}

impl From<String> for StoreError {
    fn from(s: String) -> Self {
        StoreError::backend_msg(s)
    }
}

impl From<&str> for StoreError {
    fn from(s: &str) -> Self {
        StoreError::backend_msg(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_get_context() {
        let err = StoreError::backend_msg("socket closed").in_context("User", Operation::Create);
        match &err {
            StoreError::Database {
                entity, operation, ..
            } => {
                assert_eq!(entity, "User");
                assert_eq!(*operation, Operation::Create);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn typed_errors_pass_through() {
        let err = StoreError::duplicate("User", vec!["email".to_string()], "a@x.com".to_string())
            .in_context("User", Operation::Create);
        assert!(err.is_duplicate());
        assert_eq!(err.status(), 409);
        assert_eq!(
            err.to_string(),
            "duplicate value 'a@x.com' for unique field(s) [email] of User"
        );

        let err = StoreError::not_found("User", "01").in_context("User", Operation::Get);
        assert!(err.is_not_found());
    }

    #[test]
    fn operation_codes() {
        assert_eq!(Operation::Create.code(), 'c');
        assert_eq!(Operation::List.code(), 'r');
        assert_eq!(Operation::Get.code(), 'r');
        assert_eq!(Operation::Update.code(), 'u');
        assert_eq!(Operation::Delete.code(), 'd');
    }
}
