use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ZkvError, ZkvResult};

/// Top-level configuration (loaded from zkv.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkvConfig {
    pub daemon: DaemonConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP API listen address (default: 127.0.0.1:8700)
    pub listen: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9700)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Largest accepted upload body in bytes
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of a pending login challenge (default: 300)
    pub challenge_ttl_secs: u64,
    /// Lifetime of a session token (default: 86400)
    pub session_ttl_secs: u64,
    /// Background sweep period for expired challenges/sessions (default: 60)
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Upper bound for any single backend call
    pub request_timeout_secs: u64,
    /// JSON file holding upload records and the identity record
    pub metadata_path: PathBuf,
    /// Read every chunk back after writing and re-check its hash
    pub verify_after_write: bool,
    /// Independent blob backends; chunk i goes to backend i mod N
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    S3,
    Fs,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Unique backend name, used in chunk descriptors and URLs
    pub name: String,
    pub kind: BackendKind,
    /// S3 endpoint (kind = "s3")
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket (kind = "s3")
    pub bucket: String,
    /// Root directory (kind = "fs") or key prefix (kind = "s3")
    pub root: String,
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Public URL prefix for stored chunks (default: `<kind>://<name>`)
    pub url_base: Option<String>,
    /// Reject plaintext HTTP S3 endpoints instead of warning
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunks per upload when the client does not ask for a count
    pub chunk_count: usize,
    /// Upper bound on the chunk count a client may request
    pub max_chunk_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of zkvd
    pub server: String,
    /// Where the CLI keeps its session token
    pub session_file: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8700".into(),
            metrics_addr: Some("127.0.0.1:9700".into()),
            log_level: "info".into(),
            log_format: "json".into(),
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_ttl_secs: 300,
            session_ttl_secs: 86_400,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            metadata_path: PathBuf::from("~/.local/share/zkvd/metadata.json"),
            verify_after_write: false,
            backends: (0..3)
                .map(|i| BackendConfig {
                    name: format!("local-{i}"),
                    kind: BackendKind::Fs,
                    root: format!("~/.local/share/zkvd/backend-{i}"),
                    ..Default::default()
                })
                .collect(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            kind: BackendKind::Memory,
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "zkvault".into(),
            root: "/".into(),
            access_key_id: None,
            secret_access_key: None,
            url_base: None,
            enforce_tls: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_count: 3,
            max_chunk_count: 64,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:8700".into(),
            session_file: PathBuf::from("~/.config/zkv/session"),
            request_timeout_secs: 60,
        }
    }
}

impl BackendConfig {
    /// URL prefix under which this backend's chunk keys are addressed.
    pub fn resolved_url_base(&self) -> String {
        match &self.url_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => {
                let scheme = match self.kind {
                    BackendKind::S3 => "s3",
                    BackendKind::Fs => "fs",
                    BackendKind::Memory => "memory",
                };
                format!("{scheme}://{}", self.name)
            }
        }
    }
}

impl ZkvConfig {
    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> ZkvResult<()> {
        if self.storage.backends.is_empty() {
            return Err(ZkvError::Config("no storage backends configured".into()));
        }
        let mut names = HashSet::new();
        for backend in &self.storage.backends {
            if backend.name.is_empty() {
                return Err(ZkvError::Config("backend with empty name".into()));
            }
            if !names.insert(backend.name.as_str()) {
                return Err(ZkvError::Config(format!(
                    "duplicate backend name: {}",
                    backend.name
                )));
            }
        }
        if self.transfer.chunk_count == 0 {
            return Err(ZkvError::Config("transfer.chunk_count must be >= 1".into()));
        }
        if self.transfer.max_chunk_count < self.transfer.chunk_count {
            return Err(ZkvError::Config(
                "transfer.max_chunk_count must be >= transfer.chunk_count".into(),
            ));
        }
        if self.auth.challenge_ttl_secs == 0 || self.auth.session_ttl_secs == 0 {
            return Err(ZkvError::Config("auth TTLs must be non-zero".into()));
        }
        if self.storage.request_timeout_secs == 0 {
            return Err(ZkvError::Config(
                "storage.request_timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[daemon]
listen = "0.0.0.0:8080"
log_level = "debug"
log_format = "text"
max_upload_bytes = 1048576

[auth]
challenge_ttl_secs = 120
session_ttl_secs = 3600

[storage]
request_timeout_secs = 10
metadata_path = "/var/lib/zkvd/metadata.json"
verify_after_write = true

[[storage.backends]]
name = "east"
kind = "s3"
endpoint = "https://s3.east.example.com"
bucket = "chunks-east"
access_key_id = "AKIA"
secret_access_key = "secret"
url_base = "https://cdn.east.example.com/"
enforce_tls = true

[[storage.backends]]
name = "disk"
kind = "fs"
root = "/srv/zkv"

[transfer]
chunk_count = 5

[client]
server = "https://vault.example.com"
"#;
        let config: ZkvConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.daemon.listen, "0.0.0.0:8080");
        assert_eq!(config.daemon.log_format, "text");
        assert_eq!(config.daemon.max_upload_bytes, 1048576);
        assert_eq!(config.auth.challenge_ttl_secs, 120);
        assert_eq!(config.auth.sweep_interval_secs, 60);
        assert_eq!(config.storage.backends.len(), 2);
        assert_eq!(config.storage.backends[0].kind, BackendKind::S3);
        assert_eq!(config.storage.backends[0].region, "us-east-1");
        assert_eq!(
            config.storage.backends[0].resolved_url_base(),
            "https://cdn.east.example.com"
        );
        assert_eq!(config.storage.backends[1].resolved_url_base(), "fs://disk");
        assert!(config.storage.verify_after_write);
        assert_eq!(config.transfer.chunk_count, 5);
        assert_eq!(config.client.server, "https://vault.example.com");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_defaults() {
        let config: ZkvConfig = toml::from_str("").unwrap();

        assert_eq!(config.daemon.listen, "127.0.0.1:8700");
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.auth.challenge_ttl_secs, 300);
        assert_eq!(config.auth.session_ttl_secs, 86_400);
        assert_eq!(config.storage.backends.len(), 3);
        assert_eq!(config.storage.backends[2].name, "local-2");
        assert_eq!(config.transfer.chunk_count, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = ZkvConfig::default();
        config.storage.backends[1].name = config.storage.backends[0].name.clone();
        assert!(matches!(config.validate(), Err(ZkvError::Config(_))));

        let mut config = ZkvConfig::default();
        config.storage.backends.clear();
        assert!(config.validate().is_err());

        let mut config = ZkvConfig::default();
        config.transfer.chunk_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_not_serialized() {
        let mut config = ZkvConfig::default();
        config.storage.backends[0].secret_access_key = Some("hunter2".into());
        let toml_str = toml::to_string(&config).unwrap();
        assert!(!toml_str.contains("hunter2"));

        let parsed: ZkvConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.daemon.listen, config.daemon.listen);
        assert_eq!(parsed.storage.backends.len(), 3);
    }

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/x/y")),
            PathBuf::from(home).join("x/y")
        );
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
