//! Configuration model and loader.
//!
//! The configuration is an immutable value loaded once at startup and handed
//! to each pipeline supervisor at construction; no module-scope state. Time
//! fields are human-readable duration strings (`"150ms"`, `"5m"`) parsed at
//! load time. After parsing, an environment-variable overlay is applied so
//! secrets can be injected without touching the file, then the whole tree is
//! validated; validation failures are fatal.

use std::env;
use std::path::Path;
use std::time::Duration;

use pl_error::ConfigError;
use serde::{Deserialize, Serialize};

/// Default delay before uploading, to let the producer flush data files.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(150);

/// Default interval between marker readiness checks.
pub const DEFAULT_MARKER_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of marker readiness attempts before proceeding anyway.
pub const DEFAULT_MARKER_CHECK_MAX_ATTEMPTS: u32 = 3;

/// Default minimum marker size for readiness. Zero means every marker is
/// ready on first stat, so the readiness gate is a no-op unless a producer
/// opts into a larger threshold.
pub const DEFAULT_MARKER_CHECK_MIN_SIZE: u64 = 0;

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Runtime-profiling sidecar configuration
    #[serde(default)]
    pub profiling: ProfilingConfig,

    /// Pipeline definitions; disabled entries are skipped at startup
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

/// Logging configuration.
///
/// `max_size` / `max_backups` / `max_age` / `compress` are accepted for
/// compatibility with older deployments; file rotation is daily.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// Log level filter ("trace".."error")
    pub level: String,

    /// Write human-readable logs to stderr
    pub console_logging: bool,

    /// Write logs to a file under `directory`
    pub file_logging: bool,

    /// Directory for the log file
    pub directory: String,

    /// Log file name
    pub filename: String,

    /// Accepted, rotation is time based
    pub max_size: u64,
    /// Accepted, rotation is time based
    pub max_backups: u32,
    /// Accepted, rotation is time based
    pub max_age: u32,
    /// Accepted, rotation is time based
    pub compress: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_logging: true,
            file_logging: false,
            directory: "logs".to_string(),
            filename: "pelican.log".to_string(),
            max_size: 100,
            max_backups: 3,
            max_age: 28,
            compress: false,
        }
    }
}

/// Runtime-profiling sidecar configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfilingConfig {
    /// Enable the sidecar
    pub enabled: bool,

    /// Snapshot interval
    #[serde(with = "duration_str")]
    pub interval: Duration,

    /// Directory the snapshot file is written to
    pub directory: String,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(10),
            directory: "profiling".to_string(),
        }
    }
}

/// One independent pipeline: scan root, marker pattern, matchers, backends
/// and worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Pipeline name, used in logs and backend identifiers
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Disabled pipelines are logged and skipped
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Stop the whole process when this pipeline surfaces a cycle error
    #[serde(default)]
    pub stop_on_error: bool,

    /// Scanner settings
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Processor settings
    #[serde(default)]
    pub processor: ProcessorConfig,
}

/// Scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerConfig {
    /// Absolute scan root
    pub directory: String,

    /// Marker extension, e.g. ".rcd_sig"; empty matches everything
    pub pattern: String,

    /// Sleep between scan cycles in poll mode
    #[serde(with = "duration_str")]
    pub interval: Duration,

    /// Directory entries read per readdir call
    pub batch_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            pattern: String::new(),
            interval: Duration::from_secs(5),
            batch_size: 1024,
        }
    }
}

/// Processor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorConfig {
    /// Worker tasks sharing the pipeline's marker queue
    pub max_processors: usize,

    /// Delay before the first readiness check, letting data files flush
    #[serde(with = "duration_str")]
    pub flush_delay: Duration,

    /// Marker readiness gate
    pub marker_check_config: MarkerCheckConfig,

    /// Matchers applied in order; outputs are concatenated
    pub file_matcher_configs: Vec<FileMatcherConfig>,

    /// Client retry settings
    pub retry: RetryConfig,

    /// Storage backends
    pub storage: StorageConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_processors: 1,
            flush_delay: DEFAULT_FLUSH_DELAY,
            marker_check_config: MarkerCheckConfig::default(),
            file_matcher_configs: Vec::new(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Marker readiness gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerCheckConfig {
    /// Delay between readiness attempts
    #[serde(with = "duration_str")]
    pub check_interval: Duration,

    /// Attempts before proceeding anyway with a warning
    pub max_attempts: u32,

    /// Minimum marker size in bytes; 0 disables the gate
    pub min_size: u64,
}

impl Default for MarkerCheckConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_MARKER_CHECK_INTERVAL,
            max_attempts: DEFAULT_MARKER_CHECK_MAX_ATTEMPTS,
            min_size: DEFAULT_MARKER_CHECK_MIN_SIZE,
        }
    }
}

/// Client retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Maximum client attempts per request
    pub limit: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { limit: 3 }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// S3 or S3-compatible bucket
    pub s3: BucketConfig,

    /// GCS bucket, driven through its S3-compatible endpoint
    pub gcs: BucketConfig,

    /// Local directory target
    pub local_dir: LocalDirConfig,
}

/// Bucket settings for S3 and GCS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketConfig {
    pub enabled: bool,
    pub bucket: String,
    pub region: String,
    pub prefix: String,
    /// Host\[:port\] without scheme; `http://`/`https://` prefixes are
    /// stripped at load time and drive `use_ssl`
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(rename = "useSSL")]
    pub use_ssl: bool,
}

/// Local directory target settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalDirConfig {
    pub enabled: bool,

    /// Target root directory
    pub path: String,

    /// Unix mode applied to created directories and files
    pub mode: u32,
}

impl Default for LocalDirConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: String::new(),
            mode: 0o755,
        }
    }
}

/// File matcher selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMatcherConfig {
    /// Which matcher interprets `patterns`
    pub matcher_type: MatcherKind,

    /// Patterns, interpreted per matcher
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Matcher variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    /// Extension swaps next to the marker
    Basic,
    /// Zero-padded counter runs, stopping at the first gap
    Sequential,
    /// Glob patterns rooted at the marker directory
    Glob,
}

impl std::fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Sequential => write!(f, "sequential"),
            Self::Glob => write!(f, "glob"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// True when `ext` can serve as a marker pattern: empty (match everything)
/// or a dot-prefixed extension without wildcard characters.
pub fn is_valid_marker_pattern(ext: &str) -> bool {
    if ext.is_empty() {
        return true;
    }
    ext.starts_with('.') && !ext.contains('*') && !ext.contains('?')
}

/// True when `ext` is a plain file extension (empty or starting with a dot).
/// Matchers use this to tell extension patterns from templates.
pub fn is_file_extension(ext: &str) -> bool {
    ext.is_empty() || ext.starts_with('.')
}

impl Config {
    /// Load, overlay and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let mut config: Config =
            serde_yaml::from_str(&raw).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;

        config.apply_env_overlay()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the environment-variable overlay to every pipeline.
    ///
    /// Two mechanisms stack:
    /// 1. any bucket string field whose current value names an existing
    ///    environment variable is replaced by that variable's value;
    /// 2. the well-known `S3_*` / `GCS_*` names force the matching fields
    ///    whenever they are set, regardless of the file's contents.
    ///
    /// Endpoints carrying an `http://` or `https://` prefix are normalized:
    /// the scheme is stripped and `use_ssl` set accordingly.
    pub fn apply_env_overlay(&mut self) -> Result<(), ConfigError> {
        for pipeline in &mut self.pipelines {
            let storage = &mut pipeline.processor.storage;
            overlay_bucket(&mut storage.s3, "S3")?;
            overlay_bucket(&mut storage.gcs, "GCS")?;
        }
        Ok(())
    }

    /// Semantic validation of the whole tree. Only enabled pipelines and
    /// enabled backends are checked.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pipeline in self.pipelines.iter().filter(|p| p.enabled) {
            let name = &pipeline.name;
            if name.is_empty() {
                return Err(ConfigError::Validation(
                    "pipeline is missing a name".to_string(),
                ));
            }
            if pipeline.scanner.directory.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "pipeline '{name}': scanner.directory is required"
                )));
            }
            if !is_valid_marker_pattern(&pipeline.scanner.pattern) {
                return Err(ConfigError::Validation(format!(
                    "pipeline '{name}': invalid marker pattern '{}'",
                    pipeline.scanner.pattern
                )));
            }
            if pipeline.scanner.batch_size == 0 {
                return Err(ConfigError::Validation(format!(
                    "pipeline '{name}': scanner.batchSize must be at least 1"
                )));
            }
            if pipeline.processor.max_processors == 0 {
                return Err(ConfigError::Validation(format!(
                    "pipeline '{name}': processor.maxProcessors must be at least 1"
                )));
            }

            let storage = &pipeline.processor.storage;
            if storage.s3.enabled {
                validate_bucket(&storage.s3, name, "s3")?;
            }
            if storage.gcs.enabled {
                validate_bucket(&storage.gcs, name, "gcs")?;
            }
            if storage.local_dir.enabled && storage.local_dir.path.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "pipeline '{name}': storage.localDir.path is required"
                )));
            }
        }
        Ok(())
    }

}

fn overlay_bucket(bucket: &mut BucketConfig, prefix: &str) -> Result<(), ConfigError> {
    // Generic substitution: a field whose value names an env var takes the
    // variable's value.
    for field in [
        &mut bucket.bucket,
        &mut bucket.region,
        &mut bucket.prefix,
        &mut bucket.endpoint,
        &mut bucket.access_key,
        &mut bucket.secret_key,
    ] {
        if let Ok(value) = env::var(field.as_str()) {
            if !value.is_empty() {
                *field = value;
            }
        }
    }

    // Well-known names force the matching fields when set.
    for (suffix, field) in [
        ("BUCKET", &mut bucket.bucket),
        ("REGION", &mut bucket.region),
        ("PREFIX", &mut bucket.prefix),
        ("ENDPOINT", &mut bucket.endpoint),
        ("ACCESS_KEY", &mut bucket.access_key),
        ("SECRET_KEY", &mut bucket.secret_key),
    ] {
        if let Ok(value) = env::var(format!("{prefix}_{suffix}")) {
            if !value.is_empty() {
                *field = value;
            }
        }
    }
    for (suffix, field) in [
        ("ENABLED", &mut bucket.enabled),
        ("USE_SSL", &mut bucket.use_ssl),
    ] {
        let var = format!("{prefix}_{suffix}");
        if let Ok(value) = env::var(&var) {
            if !value.is_empty() {
                *field = value.parse().map_err(|_| ConfigError::EnvOverride {
                    var,
                    value: value.clone(),
                })?;
            }
        }
    }

    // Scheme-prefixed endpoints decide use_ssl.
    if let Some(stripped) = bucket.endpoint.strip_prefix("https://") {
        bucket.endpoint = stripped.to_string();
        bucket.use_ssl = true;
    } else if let Some(stripped) = bucket.endpoint.strip_prefix("http://") {
        bucket.endpoint = stripped.to_string();
        bucket.use_ssl = false;
    }

    Ok(())
}

fn validate_bucket(bucket: &BucketConfig, pipeline: &str, section: &str) -> Result<(), ConfigError> {
    for (field, value) in [
        ("accessKey", &bucket.access_key),
        ("secretKey", &bucket.secret_key),
        ("bucket", &bucket.bucket),
        ("region", &bucket.region),
        ("endpoint", &bucket.endpoint),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!(
                "pipeline '{pipeline}': missing {field} in storage.{section} configuration"
            )));
        }
    }
    Ok(())
}

/// Parse a Go-style duration string: one or more `<number><unit>` segments,
/// units `ns`, `us`, `ms`, `s`, `m`, `h`, fractions allowed ("1.5s", "1m30s").
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let s = value.trim();
    if s.is_empty() {
        return Err(ConfigError::Duration {
            value: value.to_string(),
            reason: "empty string".to_string(),
        });
    }

    let invalid = |reason: &str| ConfigError::Duration {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| invalid("missing unit"))?;
        if digits == 0 {
            return Err(invalid("expected a number"));
        }
        let (number, tail) = rest.split_at(digits);
        let number: f64 = number.parse().map_err(|_| invalid("bad number"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let seconds = match unit {
            "ns" => number / 1e9,
            "us" | "µs" => number / 1e6,
            "ms" => number / 1e3,
            "s" => number,
            "m" => number * 60.0,
            "h" => number * 3600.0,
            _ => return Err(invalid(&format!("unknown unit '{unit}'"))),
        };
        total += Duration::from_secs_f64(seconds);
        rest = next;
    }
    Ok(total)
}

/// Render a duration back into the shortest exact string form.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos % 1_000_000_000 == 0 {
        let secs = d.as_secs();
        if secs % 3600 == 0 {
            return format!("{}h", secs / 3600);
        }
        if secs % 60 == 0 {
            return format!("{}m", secs / 60);
        }
        return format!("{secs}s");
    }
    if nanos % 1_000_000 == 0 {
        return format!("{}ms", nanos / 1_000_000);
    }
    if nanos % 1_000 == 0 {
        return format!("{}us", nanos / 1_000);
    }
    format!("{nanos}ns")
}

/// Serde adapter storing durations as human strings.
mod duration_str {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
