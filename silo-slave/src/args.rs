//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

/// Get default config path help text for current platform
fn default_config_help() -> String {
    #[cfg(target_os = "linux")]
    return "Configuration file (default: ~/.config/silo/slave.toml)".to_string();

    #[cfg(target_os = "macos")]
    return "Configuration file (default: ~/Library/Application Support/silo/slave.toml)"
        .to_string();

    #[cfg(target_os = "windows")]
    return "Configuration file (default: %APPDATA%\\silo\\slave.toml)".to_string();

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    return "Configuration file (overrides platform default)".to_string();
}

/// Silo storage slave
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path (overrides platform default)
    #[arg(short, long, help = default_config_help())]
    pub config: Option<PathBuf>,

    /// Master host name or address (overrides the config file)
    #[arg(long)]
    pub master_host: Option<String>,

    /// Master control port (overrides the config file)
    #[arg(long)]
    pub master_port: Option<u16>,

    /// Name this slave announces in the handshake (overrides the config file)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Add a storage root (repeatable, replaces the roots from the config file)
    #[arg(short, long = "root")]
    pub roots: Vec<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["silod"]);
        assert!(args.config.is_none());
        assert!(args.roots.is_empty());
        assert!(!args.debug);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "silod",
            "--master-host",
            "master.example.net",
            "--master-port",
            "2100",
            "--name",
            "slave07",
            "--root",
            "/mnt/a",
            "--root",
            "/mnt/b",
            "--debug",
        ]);
        assert_eq!(args.master_host.as_deref(), Some("master.example.net"));
        assert_eq!(args.master_port, Some(2100));
        assert_eq!(args.name.as_deref(), Some("slave07"));
        assert_eq!(args.roots, vec![PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b")]);
        assert!(args.debug);
    }
}
