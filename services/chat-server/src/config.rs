//! Server configuration: CLI parsing and the fatal-startup error type.

use clap::{Arg, Command};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
    Http,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => write!(f, "tcp"),
            Transport::Udp => write!(f, "udp"),
            Transport::Http => write!(f, "http"),
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            "http" => Ok(Transport::Http),
            other => Err(format!("unsupported transport '{other}' (expected tcp, udp, or http)")),
        }
    }
}

/// Fatal errors that abort startup before the server can accept a single client.
#[derive(Debug)]
pub enum RelayError {
    Bind { addr: String, source: std::io::Error },
    UnsupportedTransport(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
            RelayError::UnsupportedTransport(t) => write!(f, "unsupported transport: {t}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Bind { source, .. } => Some(source),
            RelayError::UnsupportedTransport(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ip: IpAddr,
    pub port: u16,
    pub transport: Transport,
    pub sweep_interval: std::time::Duration,
    pub idle_timeout: std::time::Duration,
    pub log_level: String,
}

fn validate_ip(value: &str) -> Result<IpAddr, String> {
    value.parse::<IpAddr>().map_err(|_| "invalid IP address".to_owned())
}

fn validate_port(value: &str) -> Result<u16, String> {
    value.parse::<u16>().map_err(|_| "invalid port number".to_owned())
}

fn validate_transport(value: &str) -> Result<Transport, String> {
    value.parse()
}

fn validate_secs(value: &str) -> Result<u64, String> {
    value.parse::<u64>().map_err(|_| "invalid number of seconds".to_owned())
}

/// Long flag names this server accepts Go `flag`-package style, with a
/// single leading dash (`-ip`, `-sweep-interval-secs`, ...), matching the
/// external interface documented for this CLI. `clap`'s long flags only
/// match on `--`, so these are rewritten to their GNU double-dash spelling
/// before parsing; `--ip` etc. keep working too.
const GO_STYLE_LONG_FLAGS: &[&str] = &["ip", "port", "sweep-interval-secs", "idle-timeout-secs", "log-level"];

fn normalize_go_style_flags(args: Vec<std::ffi::OsString>) -> Vec<std::ffi::OsString> {
    args.into_iter()
        .map(|arg| {
            let Some(s) = arg.to_str() else { return arg };
            let Some(rest) = s.strip_prefix('-') else { return arg };
            if rest.starts_with('-') {
                return arg; // already `--long`
            }
            let name = rest.split('=').next().unwrap_or(rest);
            if GO_STYLE_LONG_FLAGS.contains(&name) {
                std::ffi::OsString::from(format!("-{s}"))
            } else {
                arg
            }
        })
        .collect()
}

/// Parse `Config` from `std::env::args()`.
pub fn parse() -> Config {
    parse_from(std::env::args_os())
}

/// Parse `Config` from an explicit argument list, for tests.
pub fn parse_from<I, T>(args: I) -> Config
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let args = normalize_go_style_flags(args.into_iter().map(Into::into).collect());
    let matches = Command::new("Chat Relay Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A multi-transport (TCP/UDP/WebSocket) chat relay server")
        .arg(
            Arg::new("ip")
                .help("The IP address to bind to")
                .long("ip")
                .value_parser(validate_ip)
                .default_value("127.0.0.1"),
        )
        .arg(
            Arg::new("port")
                .help("The port to bind to")
                .short('P')
                .long("port")
                .value_parser(validate_port)
                .default_value("4545"),
        )
        .arg(
            Arg::new("transport")
                .help("The transport to serve: tcp, udp, or http (WebSocket)")
                .short('p')
                .long("transport")
                .value_parser(validate_transport)
                .required(true),
        )
        .arg(
            Arg::new("sweep_interval_secs")
                .help("How often to sweep idle UDP sessions")
                .long("sweep-interval-secs")
                .value_parser(validate_secs)
                .default_value("120"),
        )
        .arg(
            Arg::new("idle_timeout_secs")
                .help("How long a UDP session may be silent before it is pruned")
                .long("idle-timeout-secs")
                .value_parser(validate_secs)
                .default_value("120"),
        )
        .arg(
            Arg::new("log_level")
                .help("Log level, overridden by RUST_LOG if set")
                .long("log-level")
                .default_value("info"),
        )
        .get_matches_from(args);

    Config {
        ip: *matches.get_one::<IpAddr>("ip").expect("ip has a default"),
        port: *matches.get_one::<u16>("port").expect("port has a default"),
        transport: *matches
            .get_one::<Transport>("transport")
            .expect("transport is required"),
        sweep_interval: std::time::Duration::from_secs(
            *matches
                .get_one::<u64>("sweep_interval_secs")
                .expect("sweep_interval_secs has a default"),
        ),
        idle_timeout: std::time::Duration::from_secs(
            *matches
                .get_one::<u64>("idle_timeout_secs")
                .expect("idle_timeout_secs has a default"),
        ),
        log_level: matches
            .get_one::<String>("log_level")
            .expect("log_level has a default")
            .clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_with_only_required_transport() {
        let config = parse_from(["chat-server", "-p", "tcp"]);
        assert_eq!(config.ip.to_string(), "127.0.0.1");
        assert_eq!(config.port, 4545);
        assert_eq!(config.transport, Transport::Tcp);
        assert_eq!(config.sweep_interval, std::time::Duration::from_secs(120));
        assert_eq!(config.idle_timeout, std::time::Duration::from_secs(120));
    }

    #[test]
    fn parses_overridden_flags_gnu_style() {
        let config = parse_from([
            "chat-server",
            "--ip",
            "0.0.0.0",
            "--port",
            "9000",
            "-p",
            "udp",
            "--sweep-interval-secs",
            "30",
            "--idle-timeout-secs",
            "60",
            "--log-level",
            "debug",
        ]);
        assert_eq!(config.ip.to_string(), "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.transport, Transport::Udp);
        assert_eq!(config.sweep_interval, std::time::Duration::from_secs(30));
        assert_eq!(config.idle_timeout, std::time::Duration::from_secs(60));
        assert_eq!(config.log_level, "debug");
    }

    /// The documented external interface (§6.2): single-dash, multi-character
    /// flags in the Go `flag`-package style, not GNU double-dash.
    #[test]
    fn parses_overridden_flags_go_style_single_dash() {
        let config = parse_from([
            "chat-server",
            "-ip",
            "0.0.0.0",
            "-port",
            "9000",
            "-p",
            "udp",
            "-sweep-interval-secs",
            "30",
            "-idle-timeout-secs",
            "60",
            "-log-level",
            "debug",
        ]);
        assert_eq!(config.ip.to_string(), "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.transport, Transport::Udp);
        assert_eq!(config.sweep_interval, std::time::Duration::from_secs(30));
        assert_eq!(config.idle_timeout, std::time::Duration::from_secs(60));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn go_style_rewrite_does_not_touch_the_single_char_transport_short_flag() {
        let config = parse_from(["chat-server", "-ip", "10.0.0.1", "-p", "tcp"]);
        assert_eq!(config.ip.to_string(), "10.0.0.1");
        assert_eq!(config.transport, Transport::Tcp);
    }

    #[test]
    fn transport_from_str_rejects_unknown_values() {
        assert!("carrier-pigeon".parse::<Transport>().is_err());
    }
}
