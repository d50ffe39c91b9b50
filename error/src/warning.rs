use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WarningKind {
    /// required, enum, range or type problems of a single document
    Validation,
    /// dangling or ambiguous references, unknown reference targets
    DataIntegrity,
}

impl Display for WarningKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningKind::Validation => f.write_str("validation"),
            WarningKind::DataIntegrity => f.write_str("data-integrity"),
        }
    }
}

/// Advisory issue found while serving a request. Never aborts the operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub entity: String,
    pub id: Option<String>,
    pub field: Option<String>,
}

impl Warning {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        kind: WarningKind,
        entity: S1,
        message: S2,
    ) -> Self {
        Warning {
            kind,
            message: message.into(),
            entity: entity.into(),
            id: None,
            field: None,
        }
    }

    pub fn validation<S1: Into<String>, S2: Into<String>>(entity: S1, message: S2) -> Self {
        Self::new(WarningKind::Validation, entity, message)
    }

    pub fn integrity<S1: Into<String>, S2: Into<String>>(entity: S1, message: S2) -> Self {
        Self::new(WarningKind::DataIntegrity, entity, message)
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field<S: Into<String>>(mut self, field: S) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.entity)?;
        if let Some(id) = &self.id {
            write!(f, "({})", id)?;
        }
        if let Some(field) = &self.field {
            write!(f, ".{}", field)?;
        }
        write!(f, ": {}", self.message)
    }
}
