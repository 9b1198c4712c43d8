use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::args::{join_args, split_args};
use crate::reply::ReplyKind;
use crate::{Error, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_DELIMITER: &str = "\n";
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SshAuthMethod {
    Password,
    #[default]
    PublicKey,
}

/// Parameters of an SSH tunnel to the server host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshInfo {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth_method: SshAuthMethod,
    pub password: Option<String>,
    pub public_key: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl SshInfo {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            auth_method: SshAuthMethod::default(),
            password: None,
            public_key: None,
            private_key: None,
            passphrase: None,
        }
    }
}

/// The long running protocol modes, in the order they run when several are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Latency,
    Slave,
    Rdb,
    BigKeys,
    Stat,
    Scan,
}

/// Settings of one connection. Mutated only by the connection itself in response to successful
/// protocol events (SELECT, AUTH, MOVED/ASK).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub endpoint: Endpoint,
    pub auth: Option<String>,
    pub db_index: i64,
    pub cluster_mode: bool,
    pub delimiter: String,
    pub interval: Option<Duration>,
    pub repeat: Option<i64>,
    pub pattern: Option<String>,
    /// Destination of the RDB transfer mode, `-` keeps the payload in memory.
    pub rdb_path: Option<String>,
    pub latency_mode: bool,
    pub latency_history: bool,
    pub slave_mode: bool,
    pub stat_mode: bool,
    pub scan_mode: bool,
    pub bigkeys: bool,
    pub last_reply_kind: Option<ReplyKind>,
    pub ssh: Option<SshInfo>,
    /// Location of the server dump file, used by backup and restore.
    pub server_dump_path: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            auth: None,
            db_index: 0,
            cluster_mode: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
            interval: None,
            repeat: None,
            pattern: None,
            rdb_path: None,
            latency_mode: false,
            latency_history: false,
            slave_mode: false,
            stat_mode: false,
            scan_mode: false,
            bigkeys: false,
            last_reply_kind: None,
            ssh: None,
            server_dump_path: None,
        }
    }
}

impl ConnectionConfig {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: Endpoint::Tcp {
                host: host.into(),
                port,
            },
            ..Default::default()
        }
    }

    /// Parses a redis-cli style argument line such as `-h 10.0.0.1 -p 6380 -n 2 --scan`.
    pub fn from_args_line(line: &str) -> Result<Self> {
        let argv = split_args(line)?;
        let args = Args::try_parse_from(argv).map_err(|e| Error::Config(e.to_string()))?;

        if !args.command.is_empty() {
            return Err(Error::Config(format!(
                "unexpected argument '{}'",
                args.command[0]
            )));
        }

        args.into_config()
    }

    /// Renders the settings back into an argument line accepted by [`Self::from_args_line`].
    pub fn to_args_line(&self) -> String {
        let mut argv: Vec<String> = Vec::new();

        match &self.endpoint {
            Endpoint::Tcp { host, port } => {
                argv.extend(["-h".to_string(), host.clone()]);
                argv.extend(["-p".to_string(), port.to_string()]);
            }
            Endpoint::Unix(path) => {
                argv.extend(["-s".to_string(), path.display().to_string()]);
            }
        }
        if let Some(auth) = &self.auth {
            argv.extend(["-a".to_string(), auth.clone()]);
        }
        if self.db_index != 0 {
            argv.extend(["-n".to_string(), self.db_index.to_string()]);
        }
        if let Some(interval) = self.interval {
            argv.extend(["-i".to_string(), interval.as_secs_f64().to_string()]);
        }
        if let Some(repeat) = self.repeat {
            argv.extend(["-r".to_string(), repeat.to_string()]);
        }
        if self.delimiter != DEFAULT_DELIMITER {
            argv.extend(["-d".to_string(), self.delimiter.clone()]);
        }
        if self.cluster_mode {
            argv.push("-c".to_string());
        }
        if self.latency_mode {
            argv.push("--latency".to_string());
        }
        if self.latency_history {
            argv.push("--latency-history".to_string());
        }
        if self.slave_mode {
            argv.push("--slave".to_string());
        }
        if self.stat_mode {
            argv.push("--stat".to_string());
        }
        if self.scan_mode {
            argv.push("--scan".to_string());
        }
        if let Some(pattern) = &self.pattern {
            argv.extend(["--pattern".to_string(), pattern.clone()]);
        }
        if let Some(path) = &self.rdb_path {
            argv.extend(["--rdb".to_string(), path.clone()]);
        }
        if self.bigkeys {
            argv.push("--bigkeys".to_string());
        }

        join_args(argv)
    }

    /// Modes switched on in these settings, in execution order.
    pub fn enabled_modes(&self) -> Vec<Mode> {
        let mut modes = Vec::new();
        if self.latency_mode {
            modes.push(Mode::Latency);
        }
        if self.slave_mode {
            modes.push(Mode::Slave);
        }
        if self.rdb_path.is_some() {
            modes.push(Mode::Rdb);
        }
        if self.bigkeys {
            modes.push(Mode::BigKeys);
        }
        if self.stat_mode {
            modes.push(Mode::Stat);
        }
        if self.scan_mode {
            modes.push(Mode::Scan);
        }
        modes
    }

    /// Rebinds a TCP endpoint, keeping everything else.
    pub fn set_host_port(&mut self, host: impl Into<String>, port: u16) {
        self.endpoint = Endpoint::Tcp {
            host: host.into(),
            port,
        };
    }
}

/// Command line of the client, modelled after `redis-cli`.
#[derive(Parser, Debug)]
#[command(name = "redis-admin", disable_help_flag = true, no_binary_name = true)]
pub struct Args {
    /// Server hostname
    #[arg(short = 'h', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Server socket (overrides hostname and port)
    #[arg(short, long)]
    pub socket: Option<PathBuf>,

    /// Password to use when connecting to the server
    #[arg(short, long, env = "REDISCLI_AUTH", hide_env_values = true)]
    pub auth: Option<String>,

    /// Database number
    #[arg(short = 'n', long = "db", default_value_t = 0)]
    pub db: i64,

    /// Wait this many seconds between commands, fractions allowed
    #[arg(short, long)]
    pub interval: Option<f64>,

    /// Execute the command this many times
    #[arg(short, long)]
    pub repeat: Option<i64>,

    /// Multi-bulk delimiter for raw formatting
    #[arg(short, long, default_value = DEFAULT_DELIMITER)]
    pub delimiter: String,

    /// Enable cluster mode (follow -ASK and -MOVED redirections)
    #[arg(short, long)]
    pub cluster: bool,

    /// Enter a special mode continuously sampling latency
    #[arg(long)]
    pub latency: bool,

    /// Like --latency but tracking latency changes over time
    #[arg(long)]
    pub latency_history: bool,

    /// Simulate a slave showing commands received from the master
    #[arg(long)]
    pub slave: bool,

    /// Print rolling stats about the server
    #[arg(long)]
    pub stat: bool,

    /// List all keys using the SCAN command
    #[arg(long)]
    pub scan: bool,

    /// Useful with --scan to specify a SCAN pattern
    #[arg(long)]
    pub pattern: Option<String>,

    /// Transfer an RDB dump from the remote server to a local file, `-` keeps it in memory
    #[arg(long)]
    pub rdb: Option<String>,

    /// Sample keys looking for big keys
    #[arg(long)]
    pub bigkeys: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Command to execute
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Args {
    pub fn into_config(self) -> Result<ConnectionConfig> {
        let endpoint = match self.socket {
            Some(path) => Endpoint::Unix(path),
            None => Endpoint::Tcp {
                host: self.host,
                port: self.port,
            },
        };

        let interval = self
            .interval
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| Error::Config(format!("invalid interval {secs}: {e}")))
            })
            .transpose()?;

        Ok(ConnectionConfig {
            endpoint,
            auth: self.auth,
            db_index: self.db,
            cluster_mode: self.cluster,
            delimiter: self.delimiter,
            interval,
            repeat: self.repeat,
            pattern: self.pattern,
            rdb_path: self.rdb,
            // --latency-history implies --latency.
            latency_mode: self.latency || self.latency_history,
            latency_history: self.latency_history,
            slave_mode: self.slave,
            stat_mode: self.stat,
            scan_mode: self.scan,
            bigkeys: self.bigkeys,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConnectionConfig::from_args_line("").unwrap();

        assert_eq!(config, ConnectionConfig::default());
        assert_eq!(config.endpoint.to_string(), "127.0.0.1:6379");
        assert!(config.enabled_modes().is_empty());
    }

    #[test]
    fn parse_connection_options() {
        let config =
            ConnectionConfig::from_args_line("-h 10.0.0.1 -p 6380 -a secret -n 3 -c -i 0.5")
                .unwrap();

        assert_eq!(config.endpoint.to_string(), "10.0.0.1:6380");
        assert_eq!(config.auth.as_deref(), Some("secret"));
        assert_eq!(config.db_index, 3);
        assert!(config.cluster_mode);
        assert_eq!(config.interval, Some(Duration::from_millis(500)));
    }

    #[test]
    fn socket_overrides_host() {
        let config = ConnectionConfig::from_args_line("-h other -s /tmp/redis.sock").unwrap();

        assert_eq!(config.endpoint, Endpoint::Unix(PathBuf::from("/tmp/redis.sock")));
    }

    #[test]
    fn modes_in_execution_order() {
        let config =
            ConnectionConfig::from_args_line("--scan --stat --bigkeys --rdb - --slave --latency")
                .unwrap();

        assert_eq!(
            config.enabled_modes(),
            vec![
                Mode::Latency,
                Mode::Slave,
                Mode::Rdb,
                Mode::BigKeys,
                Mode::Stat,
                Mode::Scan
            ]
        );
        assert_eq!(config.rdb_path.as_deref(), Some("-"));
    }

    #[test]
    fn latency_history_implies_latency() {
        let config = ConnectionConfig::from_args_line("--latency-history").unwrap();

        assert!(config.latency_mode);
        assert!(config.latency_history);
    }

    #[test]
    fn unknown_option_is_a_config_error() {
        let err = ConnectionConfig::from_args_line("--no-such-option").unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn render_and_parse_back() {
        let config = ConnectionConfig {
            endpoint: Endpoint::Tcp {
                host: "db.local".to_string(),
                port: 7000,
            },
            auth: Some("pass word".to_string()),
            db_index: 5,
            cluster_mode: true,
            delimiter: ",".to_string(),
            interval: Some(Duration::from_millis(250)),
            repeat: Some(3),
            pattern: Some("user:*".to_string()),
            rdb_path: Some("/tmp/dump.rdb".to_string()),
            latency_mode: true,
            latency_history: true,
            scan_mode: true,
            bigkeys: true,
            ..Default::default()
        };

        let parsed = ConnectionConfig::from_args_line(&config.to_args_line()).unwrap();

        assert_eq!(parsed, config);
    }
}
