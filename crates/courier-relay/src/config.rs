use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,

    // Framing
    pub max_envelope_bytes: usize,

    // Per-endpoint plumbing
    pub outbound_queue_len: usize,
    pub write_timeout_secs: u64,
    pub pong_wait_secs: u64,
    pub ping_period_secs: u64,

    // Rate limiting
    pub rate_limit: RateLimitConfig,

    // Graceful shutdown
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size).
    pub burst: u32,
    /// One token is restored every this many milliseconds.
    pub refill_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 5,
            refill_interval_ms: 200,
        }
    }
}

impl RateLimitConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            max_envelope_bytes: courier_proto::MAX_ENVELOPE_BYTES,
            outbound_queue_len: 256,
            write_timeout_secs: 5,
            pong_wait_secs: 60,
            ping_period_secs: 54,
            rate_limit: RateLimitConfig::default(),
            shutdown_timeout_secs: 5,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("COURIER_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }
        if let Ok(size) = std::env::var("COURIER_MAX_ENVELOPE_BYTES") {
            config.max_envelope_bytes = size.parse()?;
        }
        if let Ok(len) = std::env::var("COURIER_OUTBOUND_QUEUE_LEN") {
            config.outbound_queue_len = len.parse()?;
        }
        if let Ok(secs) = std::env::var("COURIER_PONG_WAIT_SECS") {
            config.pong_wait_secs = secs.parse()?;
        }
        if let Ok(secs) = std::env::var("COURIER_PING_PERIOD_SECS") {
            config.ping_period_secs = secs.parse()?;
        }

        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_envelope_bytes == 0 {
            anyhow::bail!("max_envelope_bytes must be > 0");
        }
        if self.outbound_queue_len == 0 {
            anyhow::bail!("outbound_queue_len must be > 0");
        }
        if self.ping_period_secs >= self.pong_wait_secs {
            anyhow::bail!("ping_period_secs must be < pong_wait_secs");
        }
        if self.rate_limit.burst == 0 {
            anyhow::bail!("rate_limit.burst must be > 0");
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RelayConfig::default().validate().unwrap();
    }

    #[test]
    fn ping_period_must_undercut_pong_wait() {
        let config = RelayConfig {
            ping_period_secs: 60,
            pong_wait_secs: 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = RelayConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: RelayConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.bind_addr, config.bind_addr);
        assert_eq!(parsed.rate_limit.burst, config.rate_limit.burst);
    }
}
