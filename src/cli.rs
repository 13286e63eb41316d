use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};

use duepi_link::config::{ClientConfig, load_config};

#[derive(Parser, Debug, Clone)]
#[command(name = "duepi", about = "Monitor and control a Duepi EVO pellet stove via its cloud relay")]
pub struct Cli {
    #[command(flatten)]
    pub conn: ConnOpts,
    /// Debug logging (every frame and reply)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Check that the stove answers, on a throwaway session
    Probe,
    /// Print the wire frame for a command code (no connection)
    Frame { code: String },
    #[command(flatten)]
    Stove(StoveCmd),
}

/// Commands that run against one shared client session.
#[derive(Subcommand, Debug, Clone)]
pub enum StoveCmd {
    /// Read the full stove state
    Status {
        /// Print JSON instead of a summary
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Read one register by name (status, room_temp, fumes_temp, ...)
    Read { register: String },
    /// Switch the stove on
    On,
    /// Switch the stove off
    Off,
    /// Set power level, 0-5 manual or 6 for auto
    Power {
        #[arg(allow_negative_numbers = true)]
        level: i32,
    },
    /// Set target room temperature in °C (10-35)
    Temp {
        #[arg(allow_negative_numbers = true)]
        celsius: f64,
    },
    /// Clear the current alarm
    ResetError,
    /// Poll the full state periodically
    Watch(WatchOpts),
    /// Send a command line, e.g. "set_temp 21" or a raw code like "D9000"
    Send {
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConnOpts {
    /// TOML config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,
    /// Relay host
    #[arg(long, global = true, env = "DUEPI_HOST")]
    pub host: Option<String>,
    /// Relay port
    #[arg(long, global = true, env = "DUEPI_PORT")]
    pub port: Option<u16>,
    /// Device code of the stove's communication module
    #[arg(long = "device", global = true, env = "DUEPI_DEVICE_CODE")]
    pub device_code: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchOpts {
    /// Poll interval in seconds
    #[arg(long, default_value_t = 12.0)]
    pub interval: f64,
    /// Stop after this many polls
    #[arg(long)]
    pub count: Option<u64>,
    /// Print JSON lines instead of summaries
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl WatchOpts {
    pub fn period(&self) -> anyhow::Result<Duration> {
        if !self.interval.is_finite() || self.interval < 1.0 {
            return Err(anyhow!("interval must be at least 1 second"));
        }
        Ok(Duration::from_secs_f64(self.interval))
    }
}

impl ConnOpts {
    /// File values first, then environment and flags on top.
    pub fn resolve(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                load_config(path).with_context(|| format!("loading {}", path.display()))?
            }
            None => ClientConfig::default(),
        };
        if let Some(host) = &self.host {
            config.relay.host = host.clone();
        }
        if let Some(port) = self.port {
            config.relay.port = port;
        }
        if let Some(code) = &self.device_code {
            config.relay.device_code = code.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use duepi_link::ConfigError;

    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "duepi", "--host", "relay.local", "--port", "4000", "--device", "ABC", "status",
        ])
        .unwrap();
        let config = cli.conn.resolve().unwrap();
        assert_eq!(config.addr(), "relay.local:4000");
        assert_eq!(config.relay.device_code, "ABC");
        assert!(matches!(cli.cmd, Cmd::Stove(StoveCmd::Status { json: false })));
    }

    #[test]
    fn negative_power_level_parses() {
        let cli = Cli::try_parse_from(["duepi", "power", "-1"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Stove(StoveCmd::Power { level: -1 })));
    }

    #[test]
    fn send_collects_words() {
        let cli = Cli::try_parse_from(["duepi", "send", "set_temp", "21"]).unwrap();
        match cli.cmd {
            Cmd::Stove(StoveCmd::Send { words }) => assert_eq!(words, ["set_temp", "21"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn offline_and_session_commands_parse() {
        let cli = Cli::try_parse_from(["duepi", "frame", "D9000"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Frame { ref code } if code == "D9000"));
        let cli = Cli::try_parse_from(["duepi", "probe"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Probe));
        let cli = Cli::try_parse_from(["duepi", "reset-error"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Stove(StoveCmd::ResetError)));
    }

    #[test]
    fn config_file_errors_keep_their_source() {
        let opts = ConnOpts {
            config: Some(PathBuf::from("/nonexistent/duepi.toml")),
            host: None,
            port: None,
            device_code: Some("ABC".into()),
        };
        let err = opts.resolve().unwrap_err();
        assert!(err.to_string().starts_with("loading /nonexistent/duepi.toml"));
        assert!(err.chain().any(|c| c.downcast_ref::<ConfigError>().is_some()));
    }

    #[test]
    fn watch_interval_floor() {
        let opts = WatchOpts {
            interval: 0.2,
            count: None,
            json: false,
        };
        assert!(opts.period().is_err());
    }
}
