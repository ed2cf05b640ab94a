//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Waypoint proxy.
///
/// Everything here overrides the corresponding configuration file value.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path. A default file is created if it is missing.
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Game-protocol listen address ("IP:PORT").
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Status endpoint port (":PORT" or "IP:PORT").
    #[arg(short, long)]
    pub web_port: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["waypoint"]);
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert!(args.listen.is_none());
        assert!(args.web_port.is_none());
        assert!(!args.debug);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "waypoint",
            "--config",
            "proxy.json",
            "--listen",
            "127.0.0.1:19133",
            "--web-port",
            ":9000",
            "--debug",
        ]);
        assert_eq!(args.config, PathBuf::from("proxy.json"));
        assert_eq!(args.listen.as_deref(), Some("127.0.0.1:19133"));
        assert_eq!(args.web_port.as_deref(), Some(":9000"));
        assert!(args.debug);
    }
}
