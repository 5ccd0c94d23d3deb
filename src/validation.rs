use serde_json::Value;

use crate::error::{ValidationError, Violation};
use crate::metadata::{MAX_KEYWORDS, MAX_SUMMARY_CHARS};
use crate::storage::Document;
use crate::types::{File, FileType, DEFAULT_ENCODING};

pub const MAX_NAME_BYTES: usize = 255;
const CHECKSUM_HEX_LEN: usize = 64;

/// Check an assembled file against the domain schema, collecting every
/// violation rather than stopping at the first.
pub fn validate_file(file: &File) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    if file.id.is_nil() {
        violations.push(Violation::new("id", "must not be nil"));
    }
    check_name(&file.name, &mut violations);
    if file.project_name.trim().is_empty() {
        violations.push(Violation::new("projectName", "must not be empty"));
    }

    if file.size != file.content.len() as u64 {
        violations.push(Violation::new(
            "size",
            format!("expected {} bytes, got {}", file.content.len(), file.size),
        ));
    }
    if file.checksum.len() != CHECKSUM_HEX_LEN
        || !file.checksum.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        violations.push(Violation::new("checksum", "must be 64 lowercase hex characters"));
    }
    if file.updated_at < file.created_at {
        violations.push(Violation::new("updatedAt", "must not precede createdAt"));
    }

    let metadata = &file.metadata;
    if metadata.encoding != DEFAULT_ENCODING {
        violations.push(Violation::new(
            "metadata.encoding",
            format!("unsupported encoding {}", metadata.encoding),
        ));
    }
    if FileType::from_mime(&metadata.mime_type).is_none() {
        violations.push(Violation::new(
            "metadata.mimeType",
            format!("unsupported mime type {}", metadata.mime_type),
        ));
    }
    if metadata.version < 1 {
        violations.push(Violation::new("metadata.version", "must be at least 1"));
    }
    if metadata.keywords.len() > MAX_KEYWORDS {
        violations.push(Violation::new(
            "metadata.keywords",
            format!("at most {} keywords allowed", MAX_KEYWORDS),
        ));
    }
    if let Some(summary) = &metadata.summary {
        if summary.chars().count() > MAX_SUMMARY_CHARS {
            violations.push(Violation::new(
                "metadata.summary",
                format!("at most {} characters allowed", MAX_SUMMARY_CHARS),
            ));
        }
    }
    if metadata.tags.iter().any(|tag| tag.trim().is_empty()) {
        violations.push(Violation::new("metadata.tags", "tags must not be empty"));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn check_name(name: &str, violations: &mut Vec<Violation>) {
    if name.trim().is_empty() {
        violations.push(Violation::new("name", "must not be empty"));
        return;
    }
    if name.len() > MAX_NAME_BYTES {
        violations.push(Violation::new(
            "name",
            format!("must be at most {} bytes", MAX_NAME_BYTES),
        ));
    }
    if name.contains(['/', '\\', '\0']) {
        violations.push(Violation::new("name", "must not contain path separators or NUL"));
    }
}

/// Validate and serialize a file into its stored document form.
pub fn file_to_document(file: &File) -> Result<Document, ValidationError> {
    validate_file(file)?;
    let mut document = serde_json::to_value(file)
        .map_err(|e| ValidationError { violations: vec![Violation::new("document", e.to_string())] })?;
    if let Value::Object(fields) = &mut document {
        fields.insert("_id".to_string(), Value::String(file.id.to_string()));
    }
    Ok(document)
}

/// Map a stored document back to a file, applying the same checks as the
/// write path.
pub fn file_from_document(document: Document) -> Result<File, ValidationError> {
    let file: File = serde_json::from_value(document)
        .map_err(|e| ValidationError { violations: vec![Violation::new("document", e.to_string())] })?;
    validate_file(&file)?;
    Ok(file)
}
