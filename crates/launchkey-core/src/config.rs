use crate::error::{LaunchKeyError, Result};
use crate::keypair::Keypair;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

pub const DEFAULT_ENDPOINT: &str = "https://api.launchkey.com/v1/";
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_DOMAIN: &str = "LAUNCHKEY_DOMAIN";
pub const ENV_APP_ID: &str = "LAUNCHKEY_APP_ID";
pub const ENV_APP_SECRET: &str = "LAUNCHKEY_APP_SECRET";
pub const ENV_KEYPAIR_PATH: &str = "LAUNCHKEY_KEYPAIR_PATH";
pub const ENV_KEYPAIR_PASSPHRASE: &str = "LAUNCHKEY_KEYPAIR_PASSPHRASE";
pub const ENV_ENDPOINT: &str = "LAUNCHKEY_ENDPOINT";
pub const ENV_OPEN_TIMEOUT: &str = "LAUNCHKEY_HTTP_OPEN_TIMEOUT";
pub const ENV_READ_TIMEOUT: &str = "LAUNCHKEY_HTTP_READ_TIMEOUT";
pub const ENV_CA_BUNDLE: &str = "LAUNCHKEY_CA_BUNDLE";

const REDACTED: &str = "[redacted]";

/// Everything a client needs, assembled once and handed to it explicitly.
#[derive(Clone)]
pub struct Config {
    pub domain: Option<String>,
    pub app_id: Option<u64>,
    pub app_secret: Option<Zeroizing<String>>,
    pub keypair: Option<Arc<Keypair>>,
    pub passphrase: Option<Zeroizing<String>>,
    pub endpoint: String,
    pub http_open_timeout: Duration,
    pub http_read_timeout: Duration,
    pub ca_bundle_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: None,
            app_id: None,
            app_secret: None,
            keypair: None,
            passphrase: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http_open_timeout: DEFAULT_OPEN_TIMEOUT,
            http_read_timeout: DEFAULT_READ_TIMEOUT,
            ca_bundle_path: None,
        }
    }
}

/// Per-client overrides layered over a shared [`Config`].
#[derive(Clone, Default)]
pub struct ConfigOverrides {
    pub domain: Option<String>,
    pub app_id: Option<u64>,
    pub app_secret: Option<Zeroizing<String>>,
    pub keypair: Option<Arc<Keypair>>,
    pub endpoint: Option<String>,
    pub http_open_timeout: Option<Duration>,
    pub http_read_timeout: Option<Duration>,
    pub ca_bundle_path: Option<PathBuf>,
}

/// Validated credential set; every field is guaranteed present.
#[derive(Clone)]
pub struct Credentials {
    pub domain: String,
    pub app_id: u64,
    pub app_secret: Zeroizing<String>,
    pub keypair: Arc<Keypair>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Build from any variable source; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config {
            domain: lookup(ENV_DOMAIN),
            passphrase: lookup(ENV_KEYPAIR_PASSPHRASE).map(Zeroizing::new),
            app_secret: lookup(ENV_APP_SECRET).map(Zeroizing::new),
            ..Config::default()
        };
        if let Some(raw) = lookup(ENV_APP_ID) {
            let id = raw
                .trim()
                .parse()
                .map_err(|_| LaunchKeyError::Encoding(format!("{ENV_APP_ID}: {raw:?} is not a number")))?;
            config.app_id = Some(id);
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            config.endpoint = endpoint;
        }
        if let Some(raw) = lookup(ENV_OPEN_TIMEOUT) {
            config.http_open_timeout = parse_seconds(ENV_OPEN_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_READ_TIMEOUT) {
            config.http_read_timeout = parse_seconds(ENV_READ_TIMEOUT, &raw)?;
        }
        config.ca_bundle_path = lookup(ENV_CA_BUNDLE).map(PathBuf::from);
        if let Some(path) = lookup(ENV_KEYPAIR_PATH) {
            config.load_keypair_file(path)?;
        }
        Ok(config)
    }

    /// Read and parse the keypair file, using the configured passphrase.
    pub fn load_keypair_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let raw = Zeroizing::new(std::fs::read(path.into())?);
        let keypair = Keypair::load(raw.as_slice(), self.passphrase.as_deref().map(String::as_str))?;
        self.keypair = Some(Arc::new(keypair));
        Ok(())
    }

    pub fn merge(&self, overrides: ConfigOverrides) -> Config {
        let mut merged = self.clone();
        if let Some(domain) = overrides.domain {
            merged.domain = Some(domain);
        }
        if let Some(app_id) = overrides.app_id {
            merged.app_id = Some(app_id);
        }
        if let Some(secret) = overrides.app_secret {
            merged.app_secret = Some(secret);
        }
        if let Some(keypair) = overrides.keypair {
            merged.keypair = Some(keypair);
        }
        if let Some(endpoint) = overrides.endpoint {
            merged.endpoint = endpoint;
        }
        if let Some(timeout) = overrides.http_open_timeout {
            merged.http_open_timeout = timeout;
        }
        if let Some(timeout) = overrides.http_read_timeout {
            merged.http_read_timeout = timeout;
        }
        if let Some(path) = overrides.ca_bundle_path {
            merged.ca_bundle_path = Some(path);
        }
        merged
    }

    pub fn validate(&self) -> Result<Credentials> {
        let domain = self.domain.clone().filter(|d| !d.is_empty());
        match (domain, self.app_id, &self.app_secret, &self.keypair) {
            (Some(domain), Some(app_id), Some(app_secret), Some(keypair)) => Ok(Credentials {
                domain,
                app_id,
                app_secret: app_secret.clone(),
                keypair: keypair.clone(),
            }),
            (domain, app_id, app_secret, keypair) => {
                let mut missing = Vec::new();
                if domain.is_none() {
                    missing.push("domain");
                }
                if app_id.is_none() {
                    missing.push("app_id");
                }
                if app_secret.is_none() {
                    missing.push("app_secret");
                }
                if keypair.is_none() {
                    missing.push("keypair");
                }
                Err(LaunchKeyError::Misconfiguration { missing })
            }
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("domain", &self.domain)
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| REDACTED))
            .field("keypair", &self.keypair)
            .field("passphrase", &self.passphrase.as_ref().map(|_| REDACTED))
            .field("endpoint", &self.endpoint)
            .field("http_open_timeout", &self.http_open_timeout)
            .field("http_read_timeout", &self.http_read_timeout)
            .field("ca_bundle_path", &self.ca_bundle_path)
            .finish()
    }
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("domain", &self.domain)
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| REDACTED))
            .field("keypair", &self.keypair)
            .field("endpoint", &self.endpoint)
            .field("http_open_timeout", &self.http_open_timeout)
            .field("http_read_timeout", &self.http_read_timeout)
            .field("ca_bundle_path", &self.ca_bundle_path)
            .finish()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("app_id", &self.app_id)
            .field("app_secret", &REDACTED)
            .field("keypair", &self.keypair)
            .finish()
    }
}

fn parse_seconds(name: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| LaunchKeyError::Encoding(format!("{name}: {raw:?} is not a number of seconds")))
}
