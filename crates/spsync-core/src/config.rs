//! Configuration module for spsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Command-line flags are applied on top of the loaded file by the CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Upload-session chunks must be a multiple of this many bytes (320 KiB).
pub const CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// Largest chunk an upload session accepts (60 MiB).
pub const MAX_CHUNK_SIZE: u64 = 60 * 1024 * 1024;

/// Hard cap on concurrent uploads.
pub const MAX_UPLOAD_WORKERS: usize = 10;

/// Largest number of requests in one metadata batch.
pub const MAX_METADATA_BATCH: usize = 20;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for spsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub delete: DeleteConfig,
    pub transfer: TransferConfig,
    pub metadata: MetadataConfig,
    pub transform: TransformConfig,
    pub logging: LoggingConfig,
}

/// Which local files take part in the sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Sync root; include patterns are resolved relative to it.
    pub root: PathBuf,
    /// Glob patterns, applied in order. A leading `!` removes matches.
    pub include: Vec<String>,
    /// Exclusion patterns (basename, path segment, extension token or full path).
    pub exclude: Vec<String>,
    /// Honor `**` in include patterns.
    pub recursive: bool,
}

/// Target document library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// SharePoint host, e.g. `contoso.sharepoint.com`.
    pub host: String,
    /// Site name under `/sites/`.
    pub site: String,
    /// `<library>[/<folder>...]`; the first segment names the document library.
    pub upload_path: String,
    pub graph_endpoint: String,
    pub login_endpoint: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
}

/// Engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upload every candidate regardless of the remote state.
    pub force_upload: bool,
    /// Attempts per unit of work (file or chunk) before giving up.
    pub max_retries: u32,
    /// Backoff base; attempt `n` waits `base * 2^n`.
    pub retry_base_delay_ms: u64,
    /// Hashing concurrency. `None` uses the number of available CPUs.
    pub hash_workers: Option<usize>,
    /// Upload concurrency, at most [`MAX_UPLOAD_WORKERS`].
    pub upload_workers: usize,
}

/// Orphan reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteConfig {
    /// Look for remote files with no local counterpart.
    pub enabled: bool,
    /// Report orphans without deleting them.
    pub dry_run: bool,
}

/// Transfer mode selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Files up to this size use a single direct upload.
    pub direct_threshold_bytes: u64,
    /// Requested chunk size for upload sessions (see [`TransferConfig::effective_chunk_size`]).
    pub chunk_size_bytes: u64,
}

/// Fingerprint column settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Name of the text column holding fingerprints.
    pub column: String,
    /// Writes per batched request, at most [`MAX_METADATA_BATCH`].
    pub batch_size: usize,
}

/// External content transform (e.g. Markdown rendering).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Program and arguments; reads the file on stdin, writes the result to
    /// stdout. Empty disables the transform.
    pub command: Vec<String>,
    /// Extensions (without dot) the transform applies to.
    pub extensions: Vec<String>,
    /// Extension given to transformed files.
    pub target_extension: String,
    /// Skip the file instead of uploading the original when the transform fails.
    pub required: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/spsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("spsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: vec!["*".to_string()],
            exclude: Vec::new(),
            recursive: false,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            site: String::new(),
            upload_path: "Documents".to_string(),
            graph_endpoint: "graph.microsoft.com".to_string(),
            login_endpoint: "login.microsoftonline.com".to_string(),
            tenant_id: None,
            client_id: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            force_upload: false,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            hash_workers: None,
            upload_workers: 4,
        }
    }
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dry_run: true,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            direct_threshold_bytes: 4 * 1024 * 1024,
            chunk_size_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            column: "FileHash".to_string(),
            batch_size: MAX_METADATA_BATCH,
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            extensions: vec!["md".to_string()],
            target_extension: "html".to_string(),
            required: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

impl RemoteConfig {
    /// Document library name (first segment of `upload_path`).
    pub fn library_name(&self) -> &str {
        self.upload_path
            .split('/')
            .find(|s| !s.is_empty())
            .unwrap_or("Documents")
    }

    /// Folder inside the library that acts as the remote root, `None` for
    /// the library root.
    pub fn root_folder(&self) -> Option<String> {
        let rest: Vec<&str> = self
            .upload_path
            .split('/')
            .filter(|s| !s.is_empty())
            .skip(1)
            .collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest.join("/"))
        }
    }
}

impl TransferConfig {
    /// Chunk size rounded up to a multiple of [`CHUNK_ALIGNMENT`] and capped
    /// at [`MAX_CHUNK_SIZE`].
    pub fn effective_chunk_size(&self) -> u64 {
        let requested = self.chunk_size_bytes.max(1);
        let aligned = requested.div_ceil(CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT;
        aligned.min(MAX_CHUNK_SIZE)
    }
}

impl SyncConfig {
    /// Hash worker count, resolved from the available CPUs when unset.
    pub fn resolved_hash_workers(&self) -> usize {
        self.hash_workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.upload_workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- local ---
        if !self.local.root.is_dir() {
            push(
                "local.root",
                format!("directory does not exist: {}", self.local.root.display()),
            );
        }
        if self.local.include.iter().all(|p| p.trim().is_empty()) {
            push("local.include", "at least one pattern is required".into());
        }

        // --- remote ---
        if self.remote.host.trim().is_empty() {
            push("remote.host", "must not be empty".into());
        }
        if self.remote.site.trim().is_empty() {
            push("remote.site", "must not be empty".into());
        }
        if self.remote.upload_path.split('/').all(|s| s.is_empty()) {
            push("remote.upload_path", "must name a document library".into());
        }
        if self.remote.upload_path.split('/').any(|s| s == "..") {
            push("remote.upload_path", "must not contain '..'".into());
        }

        // --- sync ---
        if self.sync.max_retries == 0 {
            push("sync.max_retries", "must be greater than 0".into());
        }
        if self.sync.upload_workers == 0 || self.sync.upload_workers > MAX_UPLOAD_WORKERS {
            push(
                "sync.upload_workers",
                format!("must be in range 1..={MAX_UPLOAD_WORKERS}"),
            );
        }
        if self.sync.hash_workers == Some(0) {
            push("sync.hash_workers", "must be greater than 0".into());
        }

        // --- transfer ---
        if self.transfer.direct_threshold_bytes == 0 {
            push("transfer.direct_threshold_bytes", "must be greater than 0".into());
        }
        if self.transfer.chunk_size_bytes == 0 {
            push("transfer.chunk_size_bytes", "must be greater than 0".into());
        }
        if self.transfer.chunk_size_bytes > MAX_CHUNK_SIZE {
            push(
                "transfer.chunk_size_bytes",
                format!("must not exceed {MAX_CHUNK_SIZE} bytes"),
            );
        }

        // --- metadata ---
        if self.metadata.column.trim().is_empty() {
            push("metadata.column", "must not be empty".into());
        }
        if self.metadata.batch_size == 0 || self.metadata.batch_size > MAX_METADATA_BATCH {
            push(
                "metadata.batch_size",
                format!("must be in range 1..={MAX_METADATA_BATCH}"),
            );
        }

        // --- transform ---
        if !self.transform.command.is_empty() {
            if self.transform.extensions.is_empty() {
                push("transform.extensions", "must not be empty when a command is set".into());
            }
            if self.transform.target_extension.trim().is_empty() {
                push("transform.target_extension", "must not be empty".into());
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use spsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .local_root(PathBuf::from("./site"))
///     .include(["**/*.md"])
///     .recursive(true)
///     .remote_site("contoso.sharepoint.com", "Docs")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- local ---

    pub fn local_root(mut self, root: PathBuf) -> Self {
        self.config.local.root = root;
        self
    }

    pub fn include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.local.include = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.local.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.local.recursive = recursive;
        self
    }

    // --- remote ---

    pub fn remote_site(mut self, host: impl Into<String>, site: impl Into<String>) -> Self {
        self.config.remote.host = host.into();
        self.config.remote.site = site.into();
        self
    }

    pub fn upload_path(mut self, path: impl Into<String>) -> Self {
        self.config.remote.upload_path = path.into();
        self
    }

    // --- sync ---

    pub fn force_upload(mut self, force: bool) -> Self {
        self.config.sync.force_upload = force;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.sync.retry_base_delay_ms = ms;
        self
    }

    pub fn hash_workers(mut self, n: usize) -> Self {
        self.config.sync.hash_workers = Some(n);
        self
    }

    pub fn upload_workers(mut self, n: usize) -> Self {
        self.config.sync.upload_workers = n;
        self
    }

    // --- delete ---

    pub fn delete_enabled(mut self, enabled: bool) -> Self {
        self.config.delete.enabled = enabled;
        self
    }

    pub fn delete_dry_run(mut self, dry_run: bool) -> Self {
        self.config.delete.dry_run = dry_run;
        self
    }

    // --- transfer ---

    pub fn direct_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.transfer.direct_threshold_bytes = bytes;
        self
    }

    pub fn chunk_size_bytes(mut self, bytes: u64) -> Self {
        self.config.transfer.chunk_size_bytes = bytes;
        self
    }

    // --- metadata ---

    pub fn metadata_batch_size(mut self, n: usize) -> Self {
        self.config.metadata.batch_size = n;
        self
    }

    // --- transform ---

    pub fn transform_command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.transform.command = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn transform_required(mut self, required: bool) -> Self {
        self.config.transform.required = required;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn valid_builder() -> ConfigBuilder {
        ConfigBuilder::new()
            .local_root(std::env::temp_dir())
            .remote_site("contoso.sharepoint.com", "Engineering")
    }

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.local.include, vec!["*"]);
        assert!(!cfg.local.recursive);
        assert_eq!(cfg.remote.upload_path, "Documents");
        assert_eq!(cfg.remote.graph_endpoint, "graph.microsoft.com");
        assert_eq!(cfg.remote.login_endpoint, "login.microsoftonline.com");
        assert!(!cfg.sync.force_upload);
        assert_eq!(cfg.sync.max_retries, 3);
        assert_eq!(cfg.sync.retry_base_delay_ms, 2000);
        assert_eq!(cfg.sync.upload_workers, 4);
        assert!(cfg.sync.hash_workers.is_none());
        assert!(!cfg.delete.enabled);
        assert!(cfg.delete.dry_run);
        assert_eq!(cfg.transfer.direct_threshold_bytes, 4 * 1024 * 1024);
        assert_eq!(cfg.metadata.column, "FileHash");
        assert_eq!(cfg.metadata.batch_size, 20);
        assert!(cfg.transform.command.is_empty());
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, "text");
    }

    #[test]
    fn builder_config_passes_validation() {
        let errors = valid_builder().build().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
local:
  root: /tmp/site
  include: ["**/*.md", "!drafts/**"]
  exclude: [node_modules, tmp]
  recursive: true
remote:
  host: contoso.sharepoint.com
  site: Engineering
  upload_path: Documents/Reports/2024
sync:
  max_retries: 5
  upload_workers: 8
  hash_workers: 2
delete:
  enabled: true
  dry_run: false
logging:
  level: debug
  format: json
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.local.root, PathBuf::from("/tmp/site"));
        assert_eq!(cfg.local.include.len(), 2);
        assert_eq!(cfg.local.exclude, vec!["node_modules", "tmp"]);
        assert!(cfg.local.recursive);
        assert_eq!(cfg.remote.library_name(), "Documents");
        assert_eq!(cfg.remote.root_folder().as_deref(), Some("Reports/2024"));
        assert_eq!(cfg.sync.max_retries, 5);
        assert_eq!(cfg.sync.upload_workers, 8);
        assert_eq!(cfg.sync.resolved_hash_workers(), 2);
        assert!(cfg.delete.enabled);
        assert!(!cfg.delete.dry_run);
        assert_eq!(cfg.logging.format, "json");
        // Sections absent from the file keep their defaults.
        assert_eq!(cfg.metadata.column, "FileHash");
        assert_eq!(cfg.sync.retry_base_delay_ms, 2000);
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/spsync.yaml"));
        assert_eq!(cfg.sync.upload_workers, 4);
    }

    #[test]
    fn default_path_ends_with_config_yaml() {
        let path = Config::default_path();
        assert!(path.ends_with("spsync/config.yaml"));
    }

    // -- Derived values --

    #[test]
    fn library_without_folder() {
        let remote = RemoteConfig {
            upload_path: "/Shared Documents/".into(),
            ..RemoteConfig::default()
        };
        assert_eq!(remote.library_name(), "Shared Documents");
        assert!(remote.root_folder().is_none());
    }

    #[test]
    fn chunk_size_is_aligned_and_capped() {
        let t = TransferConfig {
            chunk_size_bytes: 4 * 1024 * 1024,
            ..TransferConfig::default()
        };
        let size = t.effective_chunk_size();
        assert_eq!(size % CHUNK_ALIGNMENT, 0);
        assert!(size >= 4 * 1024 * 1024);
        assert_eq!(size, 13 * CHUNK_ALIGNMENT);

        let exact = TransferConfig {
            chunk_size_bytes: 10 * CHUNK_ALIGNMENT,
            ..TransferConfig::default()
        };
        assert_eq!(exact.effective_chunk_size(), 10 * CHUNK_ALIGNMENT);

        let huge = TransferConfig {
            chunk_size_bytes: 500 * 1024 * 1024,
            ..TransferConfig::default()
        };
        assert_eq!(huge.effective_chunk_size(), MAX_CHUNK_SIZE);
    }

    #[test]
    fn resolved_hash_workers_is_at_least_one() {
        assert!(SyncConfig::default().resolved_hash_workers() >= 1);
    }

    // -- Validation --

    #[test]
    fn upload_workers_are_capped() {
        let errors = valid_builder().upload_workers(11).build().validate();
        assert!(errors.iter().any(|e| e.field == "sync.upload_workers"));

        let errors = valid_builder().upload_workers(10).build().validate();
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_site_is_reported() {
        let errors = ConfigBuilder::new()
            .local_root(std::env::temp_dir())
            .build()
            .validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"remote.host"));
        assert!(fields.contains(&"remote.site"));
    }

    #[test]
    fn zero_values_are_rejected() {
        let errors = valid_builder()
            .max_retries(0)
            .hash_workers(0)
            .metadata_batch_size(0)
            .chunk_size_bytes(0)
            .build()
            .validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"sync.max_retries"));
        assert!(fields.contains(&"sync.hash_workers"));
        assert!(fields.contains(&"metadata.batch_size"));
        assert!(fields.contains(&"transfer.chunk_size_bytes"));
    }

    #[test]
    fn invalid_log_level_is_reported() {
        let result = valid_builder().logging_level("verbose").build_validated();
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "logging.level");
        assert!(errors[0].to_string().contains("verbose"));
    }

    #[test]
    fn transform_requires_extensions() {
        let mut cfg = valid_builder().transform_command(["pandoc"]).build();
        cfg.transform.extensions.clear();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "transform.extensions"));
    }
}
