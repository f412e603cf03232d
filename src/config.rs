//! Bridge configuration: socket endpoints, queue sizing and the SCTP latency
//! profile. Everything here is configuration, not protocol; both binaries
//! populate these structs from an optional key=value config file and then
//! command-line flags, and validation runs before any socket is opened.

use std::net::Ipv4Addr;
use std::path::Path;

use thiserror::Error;

pub const DEFAULT_UDP_PORT: u16 = 5600;
pub const DEFAULT_SCTP_PORT: u16 = 6600;
pub const DEFAULT_SCTP_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 5, 0, 1);

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MTU: usize = 2048;
pub const DEFAULT_BUFFER_KB: u32 = 16;

pub const DEFAULT_RTO_INITIAL_MS: u32 = 2;
pub const DEFAULT_RTO_MIN_MS: u32 = 2;
pub const DEFAULT_RTO_MAX_MS: u32 = 10;
pub const DEFAULT_PR_TTL_MS: u32 = 50;
pub const DEFAULT_DELAYED_ACK_MS: u32 = 10;

pub const DEFAULT_STATS_WINDOW_SECS: u64 = 10;
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_EVENT_CAPACITY: usize = 20_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("port must be nonzero")]
    ZeroPort,
    #[error("queue capacity must be at least 2 (one slot is reserved), got {0}")]
    QueueCapacity(usize),
    #[error("mtu must be between 1 and 65536, got {0}")]
    Mtu(usize),
    #[error("rto min {min} ms exceeds rto max {max} ms")]
    RtoRange { min: u32, max: u32 },
    #[error("stats window must be nonzero")]
    StatsWindow,
    #[error("report interval must be nonzero")]
    ReportInterval,
    #[error("event ring capacity must be nonzero")]
    EventCapacity,
    #[error("cannot read config file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config line {line} is not `key=value`: {text}")]
    FileSyntax { line: usize, text: String },
    #[error("unknown config key `{0}`")]
    UnknownKey(String),
    #[error("invalid value for `{key}`: {value}")]
    InvalidValue { key: String, value: String },
}

/// Association tuning applied to every SCTP socket the bridge creates.
///
/// The retransmission timeouts are far below the RFC defaults on purpose:
/// video frames are worthless after a few tens of milliseconds, so the
/// transport should either deliver fast or abandon the chunk via the
/// partial-reliability TTL.
#[derive(Debug, Clone)]
pub struct SctpTuning {
    pub rto_initial_ms: u32,
    pub rto_min_ms: u32,
    pub rto_max_ms: u32,
    /// PR-SCTP lifetime: chunks undeliverable within this many milliseconds
    /// are abandoned by the transport instead of retransmitted forever.
    pub pr_ttl_ms: u32,
    pub delayed_ack_ms: u32,
    /// Maximum INIT attempts per connection; 0 keeps the kernel default.
    pub max_init_attempts: u16,
    /// Heartbeat interval in milliseconds; 0 keeps the kernel default.
    pub heartbeat_interval_ms: u32,
}

impl Default for SctpTuning {
    fn default() -> Self {
        Self {
            rto_initial_ms: DEFAULT_RTO_INITIAL_MS,
            rto_min_ms: DEFAULT_RTO_MIN_MS,
            rto_max_ms: DEFAULT_RTO_MAX_MS,
            pr_ttl_ms: DEFAULT_PR_TTL_MS,
            delayed_ack_ms: DEFAULT_DELAYED_ACK_MS,
            max_init_attempts: 0,
            heartbeat_interval_ms: 0,
        }
    }
}

impl SctpTuning {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rto_min_ms > self.rto_max_ms {
            return Err(ConfigError::RtoRange {
                min: self.rto_min_ms,
                max: self.rto_max_ms,
            });
        }
        Ok(())
    }

    /// Handles the tuning keys shared by both config-file formats. Returns
    /// false when the key belongs to the caller.
    fn apply_kv(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        match key {
            "rto_initial" => self.rto_initial_ms = parse(key, value)?,
            "rto_min" => self.rto_min_ms = parse(key, value)?,
            "rto_max" => self.rto_max_ms = parse(key, value)?,
            "pr_ttl" => self.pr_ttl_ms = parse(key, value)?,
            "delayed_ack_time" => self.delayed_ack_ms = parse(key, value)?,
            "max_attempts" => self.max_init_attempts = parse(key, value)?,
            "heartbeat_interval" => self.heartbeat_interval_ms = parse(key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Sender-side configuration: UDP ingress, relay queue and the outbound
/// association target.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub udp_port: u16,
    pub sctp_address: Ipv4Addr,
    pub sctp_port: u16,
    pub queue_capacity: usize,
    /// Per-slot buffer size; datagrams larger than this are dropped.
    pub mtu: usize,
    pub udp_buffer_kb: u32,
    pub sctp_buffer_kb: u32,
    pub tuning: SctpTuning,
    pub verbose: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            udp_port: DEFAULT_UDP_PORT,
            sctp_address: DEFAULT_SCTP_ADDRESS,
            sctp_port: DEFAULT_SCTP_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mtu: DEFAULT_MTU,
            udp_buffer_kb: DEFAULT_BUFFER_KB,
            sctp_buffer_kb: DEFAULT_BUFFER_KB,
            tuning: SctpTuning::default(),
            verbose: false,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.udp_port == 0 || self.sctp_port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.queue_capacity < 2 {
            return Err(ConfigError::QueueCapacity(self.queue_capacity));
        }
        if self.mtu == 0 || self.mtu > 65_536 {
            return Err(ConfigError::Mtu(self.mtu));
        }
        self.tuning.validate()
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        self.apply_str(&text)
    }

    pub fn apply_str(&mut self, text: &str) -> Result<(), ConfigError> {
        for (key, value) in kv_lines(text)? {
            if self.tuning.apply_kv(key, value)? {
                continue;
            }
            match key {
                "udp_port" => self.udp_port = parse(key, value)?,
                "sctp_port" => self.sctp_port = parse(key, value)?,
                "sctp_address" => self.sctp_address = parse(key, value)?,
                "queue_capacity" => self.queue_capacity = parse(key, value)?,
                "mtu" => self.mtu = parse(key, value)?,
                "udp_buffer_kb" => self.udp_buffer_kb = parse(key, value)?,
                "sctp_buffer_kb" => self.sctp_buffer_kb = parse(key, value)?,
                "verbose" => self.verbose = parse::<u8>(key, value)? != 0,
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            }
        }
        Ok(())
    }
}

/// Receiver-side configuration: SCTP listen port, local UDP re-emit target
/// and the statistics window.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub sctp_port: u16,
    /// Local destination port for reassembled payloads (127.0.0.1).
    pub udp_port: u16,
    pub buffer_kb: u32,
    pub tuning: SctpTuning,
    pub stats_window_secs: u64,
    pub report_interval_secs: u64,
    pub event_capacity: usize,
    pub verbose: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            sctp_port: DEFAULT_SCTP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            buffer_kb: DEFAULT_BUFFER_KB,
            tuning: SctpTuning::default(),
            stats_window_secs: DEFAULT_STATS_WINDOW_SECS,
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            verbose: false,
        }
    }
}

impl ListenerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sctp_port == 0 || self.udp_port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.stats_window_secs == 0 {
            return Err(ConfigError::StatsWindow);
        }
        if self.report_interval_secs == 0 {
            return Err(ConfigError::ReportInterval);
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::EventCapacity);
        }
        self.tuning.validate()
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        self.apply_str(&text)
    }

    pub fn apply_str(&mut self, text: &str) -> Result<(), ConfigError> {
        for (key, value) in kv_lines(text)? {
            if self.tuning.apply_kv(key, value)? {
                continue;
            }
            match key {
                "sctp_port" => self.sctp_port = parse(key, value)?,
                "udp_port" => self.udp_port = parse(key, value)?,
                "buffer_kb" => self.buffer_kb = parse(key, value)?,
                "stats_window" => self.stats_window_secs = parse(key, value)?,
                "report_interval" => self.report_interval_secs = parse(key, value)?,
                "event_capacity" => self.event_capacity = parse(key, value)?,
                "verbose" => self.verbose = parse::<u8>(key, value)? != 0,
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            }
        }
        Ok(())
    }
}

/// Splits a config file into `key=value` pairs, skipping blanks and `#`
/// comments.
fn kv_lines(text: &str) -> Result<Vec<(&str, &str)>, ConfigError> {
    let mut pairs = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::FileSyntax {
                line: idx + 1,
                text: line.to_string(),
            });
        };
        pairs.push((key.trim(), value.trim()));
    }
    Ok(pairs)
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GatewayConfig::default().validate().unwrap();
        ListenerConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_port_is_rejected() {
        let cfg = GatewayConfig {
            udp_port: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroPort)));
    }

    #[test]
    fn inverted_rto_range_is_rejected() {
        let mut cfg = ListenerConfig::default();
        cfg.tuning.rto_min_ms = 20;
        cfg.tuning.rto_max_ms = 10;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::RtoRange { min: 20, max: 10 })
        ));
    }

    #[test]
    fn tiny_queue_is_rejected() {
        let cfg = GatewayConfig {
            queue_capacity: 1,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::QueueCapacity(1))));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut cfg = GatewayConfig::default();
        cfg.apply_str(
            "# bridge tuning\n\
             udp_port = 6000\n\
             sctp_address = 192.168.1.7\n\
             rto_max = 20\n\
             verbose = 1\n",
        )
        .unwrap();
        assert_eq!(cfg.udp_port, 6000);
        assert_eq!(cfg.sctp_address, Ipv4Addr::new(192, 168, 1, 7));
        assert_eq!(cfg.tuning.rto_max_ms, 20);
        assert!(cfg.verbose);
        // untouched keys keep their defaults
        assert_eq!(cfg.sctp_port, DEFAULT_SCTP_PORT);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut cfg = ListenerConfig::default();
        let err = cfg.apply_str("bogus_knob=1\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(k) if k == "bogus_knob"));
    }

    #[test]
    fn malformed_line_is_rejected() {
        let mut cfg = ListenerConfig::default();
        let err = cfg.apply_str("stats_window\n").unwrap_err();
        assert!(matches!(err, ConfigError::FileSyntax { line: 1, .. }));
    }

    #[test]
    fn bad_value_names_the_key() {
        let mut cfg = GatewayConfig::default();
        let err = cfg.apply_str("mtu=banana\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "mtu"));
    }
}
