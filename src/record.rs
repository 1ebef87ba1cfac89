use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata entry for one stored file, the sole persisted entity.
///
/// Records are created on successful upload and never updated in place. The
/// snapshot on disk is a JSON array of these, so the serialized field names
/// are fixed for compatibility with existing snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Primary key, a v4 UUID generated at creation.
    pub id: String,
    pub bucket: String,
    /// Server-generated name, unique across the whole store.
    pub filename: String,
    /// Client-supplied name, informational only.
    pub original_name: String,
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
    /// Milliseconds since the UNIX epoch; sort key and pagination cursor.
    pub created_at: i64,
}

impl FileRecord {
    /// Builds a record for a freshly stored upload, with a new id and the
    /// current timestamp.
    pub fn new(
        bucket: &str,
        filename: String,
        original_name: &str,
        mime: String,
        size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bucket: bucket.to_string(),
            filename,
            original_name: original_name.to_string(),
            mime,
            size,
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Lowercased extension of a client-supplied name, if it has one.
pub fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Generates a collision-resistant stored filename:
/// `<13-digit ms timestamp>-<uuid v4>.<ext>`.
pub fn generate_filename(ext: &str) -> String {
    format!("{}-{}.{}", Utc::now().timestamp_millis(), Uuid::new_v4(), ext)
}

/// Checks that `name` matches the server-generated filename format: 13
/// decimal digits, a dash, a 36-character lowercase UUID, a dot and a
/// lowercase alphanumeric extension. Anything else (in particular anything
/// path-traversal-shaped) is rejected before it reaches the filesystem.
pub fn is_safe_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 52 {
        return false;
    }
    if !bytes[..13].iter().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if bytes[13] != b'-' || bytes[50] != b'.' {
        return false;
    }
    if !bytes[14..50]
        .iter()
        .all(|&b| matches!(b, b'0'..=b'9' | b'a'..=b'f' | b'-'))
    {
        return false;
    }
    bytes[51..]
        .iter()
        .all(|&b| matches!(b, b'0'..=b'9' | b'a'..=b'z'))
}

/// MIME type for a (lowercase) extension. Informational only; uploads are
/// received as opaque bytes, so the type is derived from the name.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_pass_validation() {
        for ext in ["png", "jpeg", "pdf"] {
            assert!(is_safe_name(&generate_filename(ext)));
        }
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert!(!is_safe_name(""));
        assert!(!is_safe_name("cat.png"));
        assert!(!is_safe_name("../../etc/passwd"));
        assert!(!is_safe_name("1700000000000-not-a-uuid.png"));
        // Right shape but uppercase extension.
        assert!(!is_safe_name(
            "1700000000000-9f2c6f1e-1d9b-4a3e-8f5a-0b1c2d3e4f5a.PNG"
        ));
        // Missing extension.
        assert!(!is_safe_name(
            "1700000000000-9f2c6f1e-1d9b-4a3e-8f5a-0b1c2d3e4f5a"
        ));
    }

    #[test]
    fn well_formed_name_is_accepted() {
        assert!(is_safe_name(
            "1700000000000-9f2c6f1e-1d9b-4a3e-8f5a-0b1c2d3e4f5a.png"
        ));
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(extension("cat.PNG"), Some("png".to_string()));
        assert_eq!(extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn snapshot_field_names_are_stable() {
        let record = FileRecord::new(
            "photos",
            generate_filename("png"),
            "cat.png",
            "image/png".to_string(),
            10,
        );
        let json = serde_json::to_value(&record).unwrap();
        for field in ["id", "bucket", "filename", "originalName", "mime", "size", "createdAt"] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
    }
}
