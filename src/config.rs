//! Typed startup configuration, assembled once at the composition root.
//!
//! Every field has a CLI flag with an environment-variable fallback via
//! `clap`'s `env` binding, matching the variable names in the external
//! interfaces section of the spec. Nothing deeper in the call stack reads
//! `std::env` directly.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "earthring-streamd", about = "EarthRing spatial streaming core", version)]
pub struct Config {
    /// Bind address host.
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub server_host: String,

    /// Bind address port.
    #[arg(long, env = "SERVER_PORT", default_value_t = 8080)]
    pub server_port: u16,

    /// HMAC secret used to verify bearer JWTs at the upgrade boundary.
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: String,

    /// Base URL of the procedural generation service.
    #[arg(long, env = "PROCEDURAL_BASE_URL", default_value = "http://127.0.0.1:9100")]
    pub procedural_base_url: String,

    /// Timeout, in seconds, for a single procedural generation call.
    #[arg(long, env = "PROCEDURAL_TIMEOUT", default_value_t = 30)]
    pub procedural_timeout_secs: u64,

    /// Bounded retry count for procedural generation calls.
    #[arg(long, env = "PROCEDURAL_RETRY_COUNT", default_value_t = 3)]
    pub procedural_retry_count: u32,

    /// Opaque label for the backing relational store; this core does not
    /// dial out to it, the process-local repositories stand in for it.
    #[arg(long, env = "DB_DSN", default_value = "")]
    pub db_dsn: String,

    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "debug".
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// "text" or "json".
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Ceiling on a subscription's requested radius, in meters.
    #[arg(long, env = "STREAM_MAX_RADIUS_M", default_value_t = 50_000.0)]
    pub max_radius_m: f64,

    /// Ring circumference, in meters.
    #[arg(long, env = "RING_CIRCUMFERENCE_M", default_value_t = 264_000_000)]
    pub ring_circumference_m: i64,

    /// Chunk length along the ring, in meters. Must evenly divide the circumference.
    #[arg(long, env = "RING_CHUNK_LENGTH_M", default_value_t = 1_000)]
    pub ring_chunk_length_m: i64,

    /// Width of the playfield off the center line, in meters.
    #[arg(long, env = "RING_WIDTH_M", default_value_t = 2_000)]
    pub ring_width_m: i64,
}

impl Config {
    pub fn procedural_timeout(&self) -> Duration {
        Duration::from_secs(self.procedural_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_args() {
        let cfg = Config::parse_from(["earthring-streamd", "--jwt-secret", "s3cr3t"]);
        assert_eq!(cfg.server_port, 8080);
        assert_eq!(cfg.jwt_secret, "s3cr3t");
        assert_eq!(cfg.ring_circumference_m, 264_000_000);
    }
}
