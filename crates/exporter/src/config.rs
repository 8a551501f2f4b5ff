use std::ffi::OsString;
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

pub const DEFAULT_FAH_ADDRESS: &str = "127.0.0.1:36330";
pub const DEFAULT_API_URL: &str = "https://api2.foldingathome.org";

#[derive(Parser, Debug)]
#[command(name = "fah-exporter", version, about = "Prometheus exporter for the Folding@home client")]
struct Args {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", default_value = "0.0.0.0:9659")]
    listen_address: SocketAddr,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    metrics_path: String,

    /// Address of the FAH client command server.
    #[arg(long = "fah.address", default_value = DEFAULT_FAH_ADDRESS)]
    fah_address: String,

    /// Seconds allowed for connecting to and reading from the FAH client.
    #[arg(long = "fah.timeout", default_value_t = 10)]
    fah_timeout: u64,

    /// Fetch donor stats from the FAH API.
    #[arg(long = "api.enable")]
    api_enable: bool,

    /// Base URL of the FAH stats API.
    #[arg(long = "api.url", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Minimum seconds between donor stats requests.
    #[arg(long = "api.throttle", default_value_t = 300)]
    api_throttle: u64,

    /// Seconds before a donor stats request is abandoned.
    #[arg(long = "api.timeout", default_value_t = 10)]
    api_timeout: u64,

    /// Log level (env-filter syntax).
    #[arg(long = "log.level", default_value = "info")]
    log_level: String,

    /// Disable logging timestamps.
    #[arg(long = "log.no-timestamps")]
    no_timestamps: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("telemetry path {0:?} must start with '/', use only letters, digits and '/-_.~', and must not be '/' or '/healthz'")]
    MetricsPath(String),
    #[error("--fah.timeout must be greater than zero")]
    ZeroTimeout,
}

/// Donor API settings; present only when enrichment is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub throttle: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub listen_address: SocketAddr,
    pub metrics_path: String,
    pub fah_address: String,
    pub fah_timeout: Duration,
    pub api: Option<ApiConfig>,
    pub log_level: String,
    pub log_timestamps: bool,
}

impl ExporterConfig {
    /// Parses the process arguments, exiting with usage on bad flags.
    pub fn from_args() -> Result<Self, ConfigError> {
        Self::from_parsed(Args::parse())
    }

    pub fn try_parse_from<I, T>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::from_parsed(Args::try_parse_from(args)?)?)
    }

    fn from_parsed(a: Args) -> Result<Self, ConfigError> {
        if !valid_metrics_path(&a.metrics_path) {
            return Err(ConfigError::MetricsPath(a.metrics_path));
        }
        if a.fah_timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let api = a.api_enable.then(|| ApiConfig {
            base_url: a.api_url,
            throttle: Duration::from_secs(a.api_throttle),
            timeout: Duration::from_secs(a.api_timeout),
        });

        Ok(Self {
            listen_address: a.listen_address,
            metrics_path: a.metrics_path,
            fah_address: a.fah_address,
            fah_timeout: Duration::from_secs(a.fah_timeout),
            api,
            log_level: a.log_level,
            log_timestamps: !a.no_timestamps,
        })
    }
}

/// A literal route path: no route captures or wildcards, nothing that needs
/// escaping in the landing page link.
fn valid_metrics_path(path: &str) -> bool {
    path.starts_with('/')
        && path != "/"
        && path != "/healthz"
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '~'))
}
