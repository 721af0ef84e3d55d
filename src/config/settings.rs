//! Configuration settings for HostFiles
//!
//! Defines the transfer limits, remote connection settings, the JSON config
//! file, CLI arguments and their defaults.

use crate::error::{HostFilesError, IoResultExt, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Inline "view" reads are refused at or above this size (1 MiB)
pub const DEFAULT_INLINE_READ_MAX: u64 = 1024 * 1024;

/// Maximum cumulative size of one upload request (1 GiB)
pub const DEFAULT_UPLOAD_QUOTA: u64 = 1024 * 1024 * 1024;

/// Number of worker chunks a folder upload is split into
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 10;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// HostFiles - manage files on remote hosts over SFTP
#[derive(Parser, Debug, Clone)]
#[command(name = "hostfiles")]
#[command(author = "HostFiles Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Browse, transfer and bulk-upload files on remote hosts over SFTP")]
#[command(long_about = r#"
HostFiles manages files on remote hosts through an SFTP session.

Features:
  - Deterministic directory listings and recursive size totals
  - Inline preview with a size cap, streamed downloads without a cap
  - Batch copy, move, rename and remove
  - Parallel folder uploads with per-worker failure isolation

Examples:
  hostfiles -r admin@10.0.0.5 ls /var/log
  hostfiles -r admin@10.0.0.5 cat /etc/hostname
  hostfiles -r admin@10.0.0.5 put-dir ./site /srv/www
  hostfiles --target-id 3 du /home
"#)]
pub struct CliArgs {
    /// Remote host (user@host[:port])
    #[arg(short = 'r', long, value_name = "USER@HOST[:PORT]", conflicts_with = "target_id")]
    pub remote: Option<String>,

    /// Saved target id from the registry
    #[arg(long, value_name = "ID")]
    pub target_id: Option<u64>,

    /// SSH private key path
    #[arg(short = 'i', long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// SSH password (prefer key or agent authentication)
    #[arg(long, env = "HOSTFILES_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Config file (JSON)
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Target registry file (JSON)
    #[arg(long, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Inline preview limit (e.g., 1M, 512K)
    #[arg(long, value_name = "SIZE")]
    pub inline_max: Option<String>,

    /// Upload quota per request (e.g., 1G)
    #[arg(long, value_name = "SIZE")]
    pub upload_quota: Option<String>,

    /// Number of folder upload workers
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List a remote directory
    #[command(name = "ls")]
    List {
        /// Remote directory
        path: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Total size of a remote directory tree
    #[command(name = "du")]
    DirSize {
        /// Remote directory
        path: String,
    },

    /// Show metadata of a remote path
    #[command(name = "stat")]
    Stat {
        /// Remote path
        path: String,
    },

    /// Print a small remote file
    #[command(name = "cat")]
    View {
        /// Remote file
        path: String,
    },

    /// Download a remote file
    #[command(name = "get")]
    Download {
        /// Remote file
        path: String,
        /// Local destination (defaults to the remote file name)
        local: Option<PathBuf>,
    },

    /// Create an empty file or a directory
    #[command(name = "create")]
    Create {
        /// Remote path
        path: String,
        /// Entry type to create
        #[arg(long = "type", value_enum, default_value = "file")]
        kind: CreateKind,
    },

    /// Replace a remote file's content with a local file
    #[command(name = "write")]
    Write {
        /// Remote file
        path: String,
        /// Local file supplying the new content
        local: PathBuf,
    },

    /// Upload a single local file into a remote directory
    #[command(name = "put")]
    Upload {
        /// Local file
        local: PathBuf,
        /// Remote directory
        remote_dir: String,
    },

    /// Upload a local folder into a remote directory
    #[command(name = "put-dir")]
    UploadFolder {
        /// Local folder
        local: PathBuf,
        /// Remote base directory
        remote_base: String,
    },

    /// Remove remote files or directories
    #[command(name = "rm")]
    Remove {
        /// Remote paths
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Copy remote paths into a remote directory
    #[command(name = "cp")]
    Copy {
        /// Source paths followed by the destination directory
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },

    /// Move remote paths into a remote directory
    #[command(name = "mv")]
    Move {
        /// Source paths followed by the destination directory
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },

    /// Rename a remote entry within its directory
    #[command(name = "rename")]
    Rename {
        /// Remote path of the entry
        path: String,
        /// New name (no directory separators)
        new_name: String,
    },

    /// Manage saved file targets
    #[command(name = "targets", subcommand)]
    Targets(TargetCommands),
}

/// Target registry subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum TargetCommands {
    /// List saved targets
    List,
    /// Save a new target
    Add {
        /// Display name
        name: String,
        /// Remote host (user@host[:port])
        remote: String,
        /// Default directory on the remote host
        #[arg(long, default_value = "/")]
        base_path: String,
    },
    /// Delete a saved target
    Remove {
        /// Target id
        id: u64,
    },
}

/// Entry type accepted by `create`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CreateKind {
    /// Regular file
    #[default]
    File,
    /// Directory
    Dir,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON lines
    Json,
}

/// Size and concurrency policy shared by the transfer gate and the uploader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferLimits {
    /// Inline reads fail with `TooLarge` at or above this size
    pub inline_read_max: u64,
    /// Maximum cumulative upload size per request
    pub upload_quota: u64,
    /// Fixed number of folder upload worker chunks
    pub upload_concurrency: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            inline_read_max: DEFAULT_INLINE_READ_MAX,
            upload_quota: DEFAULT_UPLOAD_QUOTA,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

impl TransferLimits {
    /// Reject limits that would make every request fail
    pub fn validate(&self) -> Result<()> {
        if self.upload_concurrency == 0 {
            return Err(HostFilesError::config("upload_concurrency must be at least 1"));
        }
        if self.inline_read_max == 0 {
            return Err(HostFilesError::config("inline_read_max must be greater than zero"));
        }
        Ok(())
    }
}

/// Remote host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote hostname or IP
    pub host: String,
    /// Username
    pub user: String,
    /// Port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// SSH key path
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Password (never serialized)
    #[serde(skip)]
    pub password: Option<String>,
    /// Connect timeout in seconds (0 = no timeout)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_timeout_secs() -> u64 {
    30
}

impl RemoteConfig {
    /// Build from a `user@host[:port]` spec
    pub fn from_spec(spec: &str) -> Result<Self> {
        let (user, host, port) = parse_remote_spec(spec)
            .ok_or_else(|| HostFilesError::config(format!("Invalid remote '{}', expected user@host[:port]", spec)))?;
        Ok(Self {
            host,
            user,
            port,
            key_path: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        })
    }

    /// Address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Config file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Transfer limits
    pub limits: TransferLimits,
    /// Target registry location
    pub registry_path: Option<PathBuf>,
    /// Recipient name used for notifications
    pub recipient: Option<String>,
}

impl AppConfig {
    /// Load a config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).local_path(path.display().to_string())?;
        let config: Self = serde_json::from_str(&data)?;
        config.limits.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides on top of the file values
    pub fn apply_cli(&mut self, args: &CliArgs) -> Result<()> {
        if let Some(ref size) = args.inline_max {
            self.limits.inline_read_max =
                parse_size(size).map_err(|e| HostFilesError::config(format!("Invalid inline max: {}", e)))?;
        }
        if let Some(ref size) = args.upload_quota {
            self.limits.upload_quota =
                parse_size(size).map_err(|e| HostFilesError::config(format!("Invalid upload quota: {}", e)))?;
        }
        if let Some(workers) = args.concurrency {
            self.limits.upload_concurrency = workers;
        }
        if let Some(ref path) = args.registry {
            self.registry_path = Some(path.clone());
        }
        self.limits.validate()
    }

    /// Registry path, falling back to `./hostfiles-targets.json`
    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("hostfiles-targets.json"))
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        (size.trim_end_matches(['T', 'B']), 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}

/// Parse `user@host[:port]`
pub fn parse_remote_spec(spec: &str) -> Option<(String, String, u16)> {
    let (user, host_port) = spec.split_once('@')?;
    if user.is_empty() || host_port.is_empty() {
        return None;
    }

    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (host_port, DEFAULT_SSH_PORT),
    };

    if host.is_empty() {
        return None;
    }

    Some((user.to_string(), host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_parse_remote_spec() {
        let (user, host, port) = parse_remote_spec("admin@10.0.0.5").unwrap();
        assert_eq!(user, "admin");
        assert_eq!(host, "10.0.0.5");
        assert_eq!(port, 22);

        let (_, host, port) = parse_remote_spec("root@box.lan:2222").unwrap();
        assert_eq!(host, "box.lan");
        assert_eq!(port, 2222);

        assert!(parse_remote_spec("/local/path").is_none());
        assert!(parse_remote_spec("@host").is_none());
        assert!(parse_remote_spec("user@host:notaport").is_none());
    }

    #[test]
    fn test_default_limits() {
        let limits = TransferLimits::default();
        assert_eq!(limits.inline_read_max, 1024 * 1024);
        assert_eq!(limits.upload_quota, 1024 * 1024 * 1024);
        assert_eq!(limits.upload_concurrency, 10);
        assert!(limits.validate().is_ok());

        let bad = TransferLimits {
            upload_concurrency: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_load_config_with_partial_limits() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hostfiles.json");
        std::fs::write(&path, r#"{ "limits": { "upload_concurrency": 4 } }"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.limits.upload_concurrency, 4);
        assert_eq!(config.limits.upload_quota, DEFAULT_UPLOAD_QUOTA);
        assert!(config.registry_path.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let args = CliArgs::parse_from([
            "hostfiles",
            "-r",
            "u@h",
            "--inline-max",
            "64K",
            "--concurrency",
            "3",
            "ls",
            "/tmp",
        ]);
        let mut config = AppConfig::default();
        config.apply_cli(&args).unwrap();
        assert_eq!(config.limits.inline_read_max, 64 * 1024);
        assert_eq!(config.limits.upload_concurrency, 3);
    }
}
