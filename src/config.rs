//! Configuration for Farmgate
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Farmgate - HTTP record-keeping gateway for mixed dairy/poultry farms
#[derive(Parser, Debug, Clone)]
#[command(name = "farmgate")]
#[command(about = "Farm record-keeping API over MongoDB")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "farmgate")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Enable development mode (insecure JWT fallback, error detail in responses)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Default page size for list endpoints
    #[arg(long, env = "DEFAULT_PAGE_SIZE", default_value = "10")]
    pub default_page_size: i64,

    /// Maximum page size a client may request
    #[arg(long, env = "MAX_PAGE_SIZE", default_value = "100")]
    pub max_page_size: i64,

    /// Maximum accepted JSON body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "65536")]
    pub max_body_bytes: usize,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> String {
        if self.dev_mode {
            self.jwt_secret
                .clone()
                .unwrap_or_else(|| "dev-only-insecure-secret".to_string())
        } else {
            self.jwt_secret
                .clone()
                .expect("JWT_SECRET is required in production mode")
        }
    }

    /// Clamp a client-requested page size to the configured bounds
    pub fn clamp_page_size(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(n) if n > 0 => n.min(self.max_page_size),
            _ => self.default_page_size,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.default_page_size <= 0 || self.max_page_size <= 0 {
            return Err("page sizes must be positive".to_string());
        }

        if self.default_page_size > self.max_page_size {
            return Err("DEFAULT_PAGE_SIZE must not exceed MAX_PAGE_SIZE".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_args() -> Args {
        Args::parse_from(["farmgate", "--dev-mode"])
    }

    #[test]
    fn test_dev_mode_jwt_fallback() {
        let args = dev_args();
        assert_eq!(args.jwt_secret(), "dev-only-insecure-secret");
    }

    #[test]
    fn test_page_size_clamping() {
        let args = dev_args();
        assert_eq!(args.clamp_page_size(None), 10);
        assert_eq!(args.clamp_page_size(Some(25)), 25);
        assert_eq!(args.clamp_page_size(Some(500)), 100);
        assert_eq!(args.clamp_page_size(Some(0)), 10);
        assert_eq!(args.clamp_page_size(Some(-3)), 10);
    }

    #[test]
    fn test_validate_requires_secret_in_production() {
        let args = Args::parse_from(["farmgate"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["farmgate", "--jwt-secret", "s3cret"]);
        assert!(args.validate().is_ok());
    }
}
