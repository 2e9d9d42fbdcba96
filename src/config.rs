//! Server configuration.
//!
//! Every option can be given as a command-line flag or through the
//! environment variable named next to it.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::{
    Endpoint, ProviderPolicy, ProviderSettings, DEFAULT_GOOGLE_BASE_URL, DEFAULT_GOOGLE_MODEL,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};

fn parse_policy(s: &str) -> Result<ProviderPolicy, String> {
    s.parse()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cortex", version, about = "The Second Brain Cortex")]
pub struct Config {
    /// Path of the SQLite database holding notes.
    #[arg(long, env = "CORTEX_DB_PATH", default_value = "database.db")]
    pub db_path: PathBuf,

    /// Address to bind.
    #[arg(long, env = "CORTEX_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// The port to listen on.
    #[arg(short, long, env = "CORTEX_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Origins allowed to call the API from a browser.
    #[arg(
        long,
        env = "CORTEX_CORS_ORIGINS",
        value_delimiter = ',',
        default_values_t = ["http://localhost:3000".to_string(), "http://127.0.0.1:3000".to_string()]
    )]
    pub cors_origins: Vec<String>,

    /// What to do with unrecognized provider names: `fallback` or `strict`.
    #[arg(long, env = "CORTEX_PROVIDER_POLICY", default_value = "fallback", value_parser = parse_policy)]
    pub provider_policy: ProviderPolicy,

    /// Upper bound in seconds on a single provider call.
    #[arg(long, env = "CORTEX_PROVIDER_TIMEOUT_SECS")]
    pub provider_timeout_secs: Option<u64>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL)]
    pub openai_model: String,

    #[arg(long, env = "GOOGLE_BASE_URL", default_value = DEFAULT_GOOGLE_BASE_URL)]
    pub google_base_url: String,

    #[arg(long, env = "GOOGLE_MODEL", default_value = DEFAULT_GOOGLE_MODEL)]
    pub google_model: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "CORTEX_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    /// Socket address the server listens on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Provider adapter settings derived from this configuration.
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            policy: self.provider_policy,
            timeout: self.provider_timeout_secs.map(Duration::from_secs),
            openai: Endpoint::new(&self.openai_base_url, &self.openai_model),
            google: Endpoint::new(&self.google_base_url, &self.google_model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["cortex"]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8000");
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.provider_settings(), ProviderSettings::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::try_parse_from([
            "cortex",
            "--port",
            "9000",
            "--provider-policy",
            "strict",
            "--provider-timeout-secs",
            "30",
            "--cors-origins",
            "http://a.test,http://b.test",
            "--google-model",
            "gemini-pro",
        ])
        .unwrap();

        let settings = config.provider_settings();
        assert_eq!(settings.policy, ProviderPolicy::Strict);
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.google.model, "gemini-pro");
        assert_eq!(config.cors_origins, ["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        assert!(Config::try_parse_from(["cortex", "--provider-policy", "loose"]).is_err());
    }
}
