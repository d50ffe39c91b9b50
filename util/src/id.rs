use parking_lot::Mutex;
use std::sync::LazyLock;
use ulid::{Generator, Ulid};

/// keeps state so ids generated within the same millisecond stay ordered
static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// New sortable document id, 26 lowercase characters.
pub fn new_id() -> String {
    let ulid = GENERATOR.lock().generate().unwrap_or_else(|_| Ulid::new());
    ulid.to_string().to_lowercase()
}

/// Identifiers are compared and stored lowercase without surrounding whitespace.
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}
