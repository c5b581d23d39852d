// 📥 Source extraction
// Reads the listing document (a JSON array of flat objects) into ordered records

use crate::error::ExtractionError;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

// ============================================================================
// CORE TYPES
// ============================================================================

/// One flat listing object, tagged with its position in the source array.
///
/// Values stay loosely typed: strings, numbers, nested arrays/objects, or
/// string-serialized lists. Typing happens later in `coercion::clean`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub index: usize,
    pub fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn new(index: usize, fields: Map<String, Value>) -> Self {
        SourceRecord { index, fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Textual view of a field. Missing and null fields read as empty string.
    pub fn text(&self, key: &str) -> String {
        text_value(self.fields.get(key))
    }
}

/// A parsed document plus the SHA-256 fingerprint of its bytes.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub records: Vec<SourceRecord>,
    pub fingerprint: String,
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Parse a raw document into ordered records.
pub fn extract(source: &str) -> Result<Vec<SourceRecord>, ExtractionError> {
    let document: Value = serde_json::from_str(source)?;

    let items = match document {
        Value::Array(items) => items,
        other => {
            return Err(ExtractionError::NotAnArray {
                found: json_kind(&other),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(SourceRecord::new(index, fields)),
            other => Err(ExtractionError::NotAnObject {
                index,
                found: json_kind(&other),
            }),
        })
        .collect()
}

/// Read and extract a document from disk.
pub fn extract_file(path: &Path) -> Result<SourceDocument, ExtractionError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ExtractionError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let records = extract(&raw)?;
    let fingerprint = fingerprint(raw.as_bytes());

    info!(
        path = %path.display(),
        records = records.len(),
        fingerprint = %fingerprint,
        "extracted source document"
    );

    Ok(SourceDocument {
        records,
        fingerprint,
    })
}

/// SHA-256 of the document bytes, hex encoded
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

/// Render a loosely-typed value as the text a VARCHAR-ish column would hold.
pub fn text_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_preserves_order() {
        let records = extract(r#"[{"City": "Austin"}, {"City": "Dallas"}, {}]"#).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].index, 0);
        assert_eq!(records[1].text("City"), "Dallas");
        assert_eq!(records[2].index, 2);
    }

    #[test]
    fn test_extract_rejects_invalid_json() {
        let err = extract("[{\"City\": ").unwrap_err();
        assert!(matches!(err, ExtractionError::Json(_)));
    }

    #[test]
    fn test_extract_rejects_non_array_document() {
        let err = extract(r#"{"City": "Austin"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::NotAnArray { found: "object" }));
    }

    #[test]
    fn test_extract_rejects_non_object_record() {
        let err = extract(r#"[{"City": "Austin"}, 42]"#).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::NotAnObject { index: 1, found: "number" }
        ));
    }

    #[test]
    fn test_extract_empty_array() {
        let records = extract("[]").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_extract_file_missing() {
        let err = extract_file(Path::new("/nonexistent/listings.json")).unwrap_err();
        assert!(matches!(err, ExtractionError::Io { .. }));
    }

    #[test]
    fn test_text_value_defaults_to_empty() {
        assert_eq!(text_value(None), "");
        assert_eq!(text_value(Some(&Value::Null)), "");
        assert_eq!(text_value(Some(&json!(78704))), "78704");
        assert_eq!(text_value(Some(&json!("TX"))), "TX");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint(b"[]");
        let b = fingerprint(b"[]");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "SHA-256 hash should be 64 hex characters");
        assert_ne!(a, fingerprint(b"[{}]"));
    }
}
