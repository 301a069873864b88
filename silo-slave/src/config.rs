//! Slave configuration
//!
//! Loaded from a TOML file, then overridden by command-line arguments. Every
//! field has a default so a minimal file only needs a name and some roots:
//!
//! ```toml
//! [slave]
//! name = "slave01"
//! roots = ["/mnt/disk1/site", "/mnt/disk2/site"]
//!
//! [master]
//! host = "master.example.net"
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use silo_common::{DEFAULT_MASTER_PORT, DEFAULT_MAX_PATH_LENGTH, MAX_SLAVE_NAME_LENGTH};
use thiserror::Error;

use crate::args::Args;
use crate::constants::{CERT_DIR_NAME, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not determine a configuration directory for this platform")]
    NoConfigDir,

    #[error("slave name must be 1 to {MAX_SLAVE_NAME_LENGTH} characters")]
    InvalidName,

    #[error("at least one storage root must be configured")]
    NoRoots,

    #[error("invalid passive port range {from:?}-{to:?}")]
    InvalidPortRange { from: Option<u16>, to: Option<u16> },

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("inactivity timeout must not be shorter than the read timeout")]
    TimeoutOrder,
}

/// Complete slave configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub master: MasterSection,
    pub slave: SlaveSection,
    pub ports: PortsSection,
    pub checksums: ChecksumSection,
    pub tls: TlsSection,
    pub transfers: TransferSection,
    pub remerge: RemergeSection,
}

/// Where the master lives and how to reach it
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MasterSection {
    pub host: String,
    pub port: u16,
    /// Wrap the control connection in TLS
    pub tls: bool,
    /// Expected SHA-256 fingerprint of the master certificate (colon-separated hex)
    pub fingerprint: Option<String>,
}

impl Default for MasterSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_MASTER_PORT,
            tls: false,
            fingerprint: None,
        }
    }
}

/// Identity, storage, and control-loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlaveSection {
    pub name: String,
    /// Local address for passive listeners and outgoing connections
    pub bind_ip: Option<IpAddr>,
    /// Silence from the master longer than this drops the connection
    pub timeout_secs: u64,
    /// How long one control-socket read waits before re-checking liveness
    pub read_timeout_secs: u64,
    /// Socket buffer size for data channels (0 = OS default)
    pub buffer_size: usize,
    pub max_path_length: u32,
    /// List roots in parallel during remerge
    pub concurrent_root_iteration: bool,
    /// Name of the registered disk selection strategy
    pub disk_selection: String,
    pub roots: Vec<PathBuf>,
    /// Permit several roots on one filesystem
    pub allow_shared_mounts: bool,
    /// Upper bound on commands executing at once
    pub max_workers: usize,
}

impl Default for SlaveSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            bind_ip: None,
            timeout_secs: 60,
            read_timeout_secs: 10,
            buffer_size: 0,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            concurrent_root_iteration: false,
            disk_selection: "mostfree".to_string(),
            roots: Vec::new(),
            allow_shared_mounts: false,
            max_workers: 256,
        }
    }
}

/// Passive port window
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortsSection {
    pub from: Option<u16>,
    pub to: Option<u16>,
}

impl PortsSection {
    /// The configured window, or `None` to let the OS pick
    #[must_use]
    pub fn range(&self) -> Option<(u16, u16)> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }
}

/// CRC32 toggles per direction
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksumSection {
    pub upload: bool,
    pub download: bool,
}

impl Default for ChecksumSection {
    fn default() -> Self {
        Self {
            upload: true,
            download: true,
        }
    }
}

/// TLS material and cipher/protocol filtering
///
/// Patterns are regular expressions matched against rustls suite names
/// (e.g. `TLS13_AES_256_GCM_SHA384`) and protocol names (`TLSv1_2`,
/// `TLSv1_3`). An empty allow list admits everything; the deny list is
/// applied afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsSection {
    /// Directory holding `cert.pem`/`key.pem` (generated when missing)
    pub cert_dir: Option<PathBuf>,
    pub cipher_allow: Vec<String>,
    pub cipher_deny: Vec<String>,
    pub protocol_allow: Vec<String>,
    pub protocol_deny: Vec<String>,
}

/// Transfer engine timing policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSection {
    /// How long a passive listener waits for the client
    pub accept_timeout_secs: u64,
    /// How long an active connection attempt may take
    pub connect_timeout_secs: u64,
    pub status_interval_ms: u64,
    /// Minimum-speed checks start after this much transfer time
    pub min_speed_grace_ms: u64,
    /// Cadence of minimum-speed checks after the grace window
    pub min_speed_interval_ms: u64,
    /// Poll interval while a download waits for its upload to grow
    pub upload_poll_ms: u64,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            accept_timeout_secs: 60,
            connect_timeout_secs: 30,
            status_interval_ms: 1000,
            min_speed_grace_ms: 5000,
            min_speed_interval_ms: 5000,
            upload_poll_ms: 500,
        }
    }
}

impl TransferSection {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_secs(self.accept_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn min_speed_grace(&self) -> Duration {
        Duration::from_millis(self.min_speed_grace_ms)
    }

    pub fn min_speed_interval(&self) -> Duration {
        Duration::from_millis(self.min_speed_interval_ms)
    }

    pub fn upload_poll(&self) -> Duration {
        Duration::from_millis(self.upload_poll_ms)
    }
}

/// Remerge policy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemergeSection {
    /// Treat every partial remerge request as a full one
    pub ignore_partial: bool,
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load configuration for the given arguments
    ///
    /// An explicit `--config` must exist. The platform default is optional:
    /// when it is missing, defaults plus command-line overrides are used.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::load(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.master_host {
            self.master.host = host.clone();
        }
        if let Some(port) = args.master_port {
            self.master.port = port;
        }
        if let Some(name) = &args.name {
            self.slave.name = name.clone();
        }
        if !args.roots.is_empty() {
            self.slave.roots = args.roots.clone();
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name_len = self.slave.name.chars().count();
        if name_len == 0 || name_len > MAX_SLAVE_NAME_LENGTH {
            return Err(ConfigError::InvalidName);
        }
        if self.slave.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }

        match (self.ports.from, self.ports.to) {
            (None, None) => {}
            (Some(from), Some(to)) if from > 0 && from <= to => {}
            (from, to) => return Err(ConfigError::InvalidPortRange { from, to }),
        }

        if self.slave.max_workers == 0 {
            return Err(ConfigError::Zero("max_workers"));
        }
        if self.slave.read_timeout_secs == 0 {
            return Err(ConfigError::Zero("read_timeout_secs"));
        }
        if self.slave.timeout_secs < self.slave.read_timeout_secs {
            return Err(ConfigError::TimeoutOrder);
        }
        if self.transfers.status_interval_ms == 0 {
            return Err(ConfigError::Zero("status_interval_ms"));
        }
        if self.transfers.min_speed_interval_ms == 0 {
            return Err(ConfigError::Zero("min_speed_interval_ms"));
        }

        for pattern in self
            .tls
            .cipher_allow
            .iter()
            .chain(&self.tls.cipher_deny)
            .chain(&self.tls.protocol_allow)
            .chain(&self.tls.protocol_deny)
        {
            compile_pattern(pattern)?;
        }

        Ok(())
    }

    /// Inactivity ceiling for the control connection
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.slave.timeout_secs)
    }

    /// Single control-socket read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.slave.read_timeout_secs)
    }

    /// Where TLS material lives, or `None` when TLS is not in use
    ///
    /// An encrypted master link without an explicit `cert_dir` falls back
    /// to the platform config directory.
    pub fn cert_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        match &self.tls.cert_dir {
            Some(dir) => Ok(Some(dir.clone())),
            None if self.master.tls => {
                let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
                Ok(Some(dir.join(CONFIG_DIR_NAME).join(CERT_DIR_NAME)))
            }
            None => Ok(None),
        }
    }
}

/// Compile one filter pattern
pub fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Platform default configuration file
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        Config::from_toml_str(
            r#"
            [slave]
            name = "slave01"
            roots = ["/mnt/a", "/mnt/b"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = minimal();
        assert!(config.validate().is_ok());
        assert_eq!(config.master.port, DEFAULT_MASTER_PORT);
        assert_eq!(config.slave.timeout_secs, 60);
        assert_eq!(config.slave.max_path_length, 4096);
        assert_eq!(config.slave.disk_selection, "mostfree");
        assert!(config.checksums.upload);
        assert!(config.checksums.download);
        assert!(config.ports.range().is_none());
        assert_eq!(config.transfers.status_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            [master]
            host = "10.0.0.1"
            port = 2100
            tls = true

            [slave]
            name = "slave02"
            roots = ["/mnt/a"]
            buffer_size = 65536
            concurrent_root_iteration = true

            [ports]
            from = 40000
            to = 40100

            [checksums]
            download = false

            [tls]
            cipher_allow = ["TLS13_.*"]
            cipher_deny = [".*CHACHA.*"]

            [transfers]
            min_speed_grace_ms = 1000
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.master.host, "10.0.0.1");
        assert!(config.master.tls);
        assert_eq!(config.ports.range(), Some((40000, 40100)));
        assert!(config.checksums.upload);
        assert!(!config.checksums.download);
        assert_eq!(config.tls.cipher_deny, vec![".*CHACHA.*".to_string()]);
        assert_eq!(config.transfers.min_speed_grace(), Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = Config::from_toml_str("[slave]\nnmae = \"typo\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_name_rejected() {
        let mut config = minimal();
        config.slave.name.clear();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidName)));
    }

    #[test]
    fn test_missing_roots_rejected() {
        let mut config = minimal();
        config.slave.roots.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoRoots)));
    }

    #[test]
    fn test_half_port_range_rejected() {
        let mut config = minimal();
        config.ports.from = Some(40000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPortRange { .. })
        ));

        config.ports.to = Some(39999);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPortRange { .. })
        ));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = minimal();
        config.tls.protocol_deny = vec!["TLSv1_(".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_cert_dir() {
        let mut config = minimal();
        assert!(config.cert_dir().unwrap().is_none());

        config.tls.cert_dir = Some(PathBuf::from("/etc/silo/tls"));
        assert_eq!(
            config.cert_dir().unwrap(),
            Some(PathBuf::from("/etc/silo/tls"))
        );
    }

    #[test]
    fn test_timeout_order() {
        let mut config = minimal();
        config.slave.timeout_secs = 5;
        config.slave.read_timeout_secs = 10;
        assert!(matches!(config.validate(), Err(ConfigError::TimeoutOrder)));
    }

    #[test]
    fn test_args_override() {
        let mut config = minimal();
        let args = Args {
            master_host: Some("override.example".to_string()),
            master_port: Some(3000),
            name: Some("renamed".to_string()),
            roots: vec![PathBuf::from("/srv/x")],
            ..Args::default()
        };
        config.apply_args(&args);
        assert_eq!(config.master.host, "override.example");
        assert_eq!(config.master.port, 3000);
        assert_eq!(config.slave.name, "renamed");
        assert_eq!(config.slave.roots, vec![PathBuf::from("/srv/x")]);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/silo/slave.toml")),
            ..Args::default()
        };
        assert!(matches!(
            Config::from_args(&args),
            Err(ConfigError::Read { .. })
        ));
    }
}
