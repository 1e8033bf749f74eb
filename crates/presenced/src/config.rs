use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the ONNX face detection model.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory for captured evidence frames.
    pub evidence_dir: PathBuf,
    /// Match tolerance: minimum acceptable confidence is `1 - tolerance`.
    pub match_tolerance: f64,
    /// Passphrase for signature-at-rest encryption. Unset = plaintext blobs.
    pub store_key: Option<String>,
}

impl Config {
    /// Load configuration from `PRESENCE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("PRESENCE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| presence_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("presence");

        let db_path = std::env::var("PRESENCE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let evidence_dir = std::env::var("PRESENCE_EVIDENCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("evidence"));

        Self {
            model_dir,
            db_path,
            evidence_dir,
            match_tolerance: env_f64("PRESENCE_MATCH_TOLERANCE", 0.5),
            store_key: std::env::var("PRESENCE_STORE_KEY").ok(),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("res10_300x300_ssd.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
