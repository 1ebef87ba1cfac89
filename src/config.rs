use std::env;
use std::path::PathBuf;

const DEFAULT_BUCKETS: &str = "preview-bounding-box,roi-face-cat,result";
const DEFAULT_EXTENSIONS: &str = "jpg,jpeg,png,webp,pdf";
const DEFAULT_MAX_FILE_MB: f64 = 8.0;
const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_UPLOAD_ROOT: &str = "public";
const DEFAULT_INDEX_FILE: &str = "data/index.json";

/// Static configuration for the depot: which buckets and extensions are
/// accepted, the upload size limit, and where uploads and the index snapshot
/// live on disk.
#[derive(Debug, Clone)]
pub struct Config {
    pub allowed_buckets: Vec<String>,
    /// Lowercase extension allow-list.
    pub allowed_extensions: Vec<String>,
    /// Maximum upload size in bytes.
    pub max_file_size: u64,
    /// Base URL used to derive public download URLs.
    pub base_url: String,
    /// Root directory holding one subdirectory per bucket.
    pub upload_root: PathBuf,
    /// Path of the JSON index snapshot.
    pub index_path: PathBuf,
}

fn env_str(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_list(key: &str, default: &str) -> Vec<String> {
    env_str(key, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_num(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Reads configuration from the environment, falling back to defaults for
    /// anything unset. Callers typically load a `.env` file first.
    pub fn from_env() -> Self {
        let max_file_mb = env_num("MAX_FILE_MB", DEFAULT_MAX_FILE_MB);
        Self {
            allowed_buckets: env_list("ALLOWED_BUCKETS", DEFAULT_BUCKETS),
            allowed_extensions: env_list("ALLOWED_EXT", DEFAULT_EXTENSIONS)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
            max_file_size: (max_file_mb * 1024.0 * 1024.0) as u64,
            base_url: env_str("BASE_URL", DEFAULT_BASE_URL),
            upload_root: PathBuf::from(env_str("UPLOAD_DIR_PUBLIC", DEFAULT_UPLOAD_ROOT)),
            index_path: PathBuf::from(env_str("INDEX_FILE", DEFAULT_INDEX_FILE)),
        }
    }

    pub fn bucket_allowed(&self, bucket: &str) -> bool {
        self.allowed_buckets.iter().any(|b| b == bucket)
    }

    /// Case-insensitive; the allow-list is stored lowercase.
    pub fn extension_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| *e == ext)
    }

    /// Bucket used when an upload does not name one.
    pub fn default_bucket(&self) -> &str {
        self.allowed_buckets
            .first()
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.upload_root.join(bucket)
    }

    pub fn file_path(&self, bucket: &str, filename: &str) -> PathBuf {
        self.bucket_path(bucket).join(filename)
    }

    /// Public download URL for a stored file, a pure function of the
    /// configured base URL and the file's location.
    pub fn public_url(&self, bucket: &str, filename: &str) -> String {
        format!("{}/files/{}/{}", self.base_url, bucket, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            allowed_buckets: vec!["photos".to_string(), "docs".to_string()],
            allowed_extensions: vec!["png".to_string(), "pdf".to_string()],
            max_file_size: 1024,
            base_url: "http://localhost:8080".to_string(),
            upload_root: PathBuf::from("public"),
            index_path: PathBuf::from("data/index.json"),
        }
    }

    #[test]
    fn bucket_membership() {
        let config = config();
        assert!(config.bucket_allowed("photos"));
        assert!(!config.bucket_allowed("scratch"));
        assert_eq!(config.default_bucket(), "photos");
    }

    #[test]
    fn extension_check_ignores_case() {
        let config = config();
        assert!(config.extension_allowed("png"));
        assert!(config.extension_allowed("PNG"));
        assert!(!config.extension_allowed("exe"));
    }

    #[test]
    fn public_url_shape() {
        let config = config();
        assert_eq!(
            config.public_url("photos", "a.png"),
            "http://localhost:8080/files/photos/a.png"
        );
    }
}
