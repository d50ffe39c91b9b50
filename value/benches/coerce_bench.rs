use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use value::{Document, FieldType, StorageTraits, Value, coerce_str, from_storage, to_storage};

fn get_values() -> Vec<(FieldType, &'static str)> {
    vec![
        (FieldType::Boolean, "true"),
        (FieldType::Integer, "42"),
        (FieldType::Float, "2.5"),
        (FieldType::String, "hello"),
        (FieldType::Date, "2024-03-01"),
        (FieldType::Datetime, "2024-03-01T10:15:30.250Z"),
        (FieldType::Json, r#"{"tags": ["a", "b"], "depth": 2}"#),
    ]
}

fn bench_coerce(c: &mut Criterion) {
    for (field_type, raw) in get_values() {
        c.bench_function(format!("coerce {}", field_type).as_str(), |b| {
            b.iter(|| coerce_str(black_box(field_type), black_box(raw)))
        });
    }
}

fn bench_storage(c: &mut Criterion) {
    for traits in [StorageTraits::NATIVE, StorageTraits::TEXTUAL] {
        for (field_type, raw) in get_values() {
            let value = coerce_str(field_type, raw);
            c.bench_function(
                format!("storage {} textual={}", field_type, traits.textual_json).as_str(),
                |b| b.iter(|| from_storage(field_type, to_storage(field_type, value.clone(), &traits))),
            );
        }
    }
}

fn bench_document(c: &mut Criterion) {
    let raw = r#"{"firstName": "Annette", "age": 31, "active": true, "tags": ["a", "b"]}"#;
    c.bench_function("parse document", |b| {
        b.iter(|| Document::parse_json(black_box(raw)))
    });
    let document = Document::parse_json(raw).unwrap_or_default();
    c.bench_function("document to json", |b| b.iter(|| document.to_json()));
    c.bench_function("compare text", |b| {
        b.iter(|| Value::text("annette").compare(&Value::text("Annette"), true))
    });
}

criterion_group!(benches, bench_coerce, bench_storage, bench_document);
criterion_main!(benches);
