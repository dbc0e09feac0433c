//! Effective configuration and the layered resolver that produces it.
//!
//! Each field is taken from the first non-empty source, in order: explicit
//! CLI value, process environment, `.env` file, built-in default. The
//! resolver works on plain maps so it never touches the real environment or
//! filesystem itself; [`process_env`] and [`load_dotenv`] snapshot those.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;
use crate::models::{Destination, MessageFormat};

/// Effective configuration for one client or one CLI invocation.
///
/// Never mutated after [`ConfigBuilder::build`]; the client replaces it
/// wholesale when a setting changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    token: String,
    destination: Destination,
    format: MessageFormat,
    timeout: Duration,
    insecure_tls: bool,
    verbose: bool,
    proxy_url: Option<String>,
}

impl Config {
    pub fn builder(token: impl Into<String>, destination: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(token, destination)
    }

    /// Builder seeded with every value of this config.
    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder {
            token: self.token.clone(),
            destination: self.destination.value().to_string(),
            format: self.format,
            timeout_secs: self.timeout.as_secs_f64(),
            insecure_tls: self.insecure_tls,
            verbose: self.verbose,
            proxy_url: self.proxy_url.clone(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn insecure_tls(&self) -> bool {
        self.insecure_tls
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref()
    }
}

/// Builder for [`Config`] with the library defaults applied.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    token: String,
    destination: String,
    format: MessageFormat,
    timeout_secs: f64,
    insecure_tls: bool,
    verbose: bool,
    proxy_url: Option<String>,
}

impl ConfigBuilder {
    pub fn new(token: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            destination: destination.into(),
            format: MessageFormat::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            insecure_tls: false,
            verbose: false,
            proxy_url: None,
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Route requests through `proxy`; `None` or an empty string disables it.
    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy_url = proxy.filter(|p| !p.is_empty());
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingRequired { key: ENV_TOKEN });
        }
        if self.destination.trim().is_empty() {
            return Err(ConfigError::MissingRequired { key: ENV_DST });
        }
        let timeout = validate_timeout(self.timeout_secs, &self.timeout_secs.to_string())?;
        if let Some(proxy) = &self.proxy_url {
            validate_proxy(proxy)?;
        }

        Ok(Config {
            token: self.token,
            destination: Destination::from_raw(self.destination),
            format: self.format,
            timeout,
            insecure_tls: self.insecure_tls,
            verbose: self.verbose,
            proxy_url: self.proxy_url,
        })
    }
}

/// Values supplied explicitly on the command line.
///
/// Boolean flags are presence-based: `true` means the flag was given, `false`
/// lets the field fall through to the environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub token: Option<String>,
    pub destination: Option<String>,
    pub format: Option<String>,
    pub timeout_secs: Option<f64>,
    pub insecure: bool,
    pub verbose: bool,
    pub proxy: Option<String>,
}

/// Merge the three sources into one validated [`Config`].
pub fn resolve(
    cli: &CliOverrides,
    env: &HashMap<String, String>,
    dotenv: &HashMap<String, String>,
) -> Result<Config, ConfigError> {
    let layers = Layers { env, dotenv };

    let token = layers
        .pick(ENV_TOKEN, cli.token.as_deref())
        .ok_or(ConfigError::MissingRequired { key: ENV_TOKEN })?;
    let destination = layers
        .pick(ENV_DST, cli.destination.as_deref())
        .ok_or(ConfigError::MissingRequired { key: ENV_DST })?;

    let format = match layers.pick(ENV_FORMAT, cli.format.as_deref()) {
        Some(raw) => raw.parse::<MessageFormat>().map_err(|reason| ConfigError::InvalidValue {
            key: ENV_FORMAT,
            value: raw,
            reason,
        })?,
        None => MessageFormat::default(),
    };

    let timeout_secs = match cli.timeout_secs {
        Some(secs) => secs,
        None => match layers.pick(ENV_TIMEOUT, None) {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: ENV_TIMEOUT,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        },
    };

    let insecure = cli.insecure || layers.pick_bool(ENV_INSECURE)?;
    let verbose = cli.verbose || layers.pick_bool(ENV_VERBOSE)?;
    let proxy = layers.pick(ENV_PROXY, cli.proxy.as_deref());

    ConfigBuilder::new(token, destination)
        .format(format)
        .timeout_secs(timeout_secs)
        .insecure_tls(insecure)
        .verbose(verbose)
        .proxy(proxy)
        .build()
}

struct Layers<'a> {
    env: &'a HashMap<String, String>,
    dotenv: &'a HashMap<String, String>,
}

impl Layers<'_> {
    fn pick(&self, key: &str, cli: Option<&str>) -> Option<String> {
        cli.filter(|v| !v.is_empty())
            .or_else(|| self.env.get(key).map(String::as_str).filter(|v| !v.is_empty()))
            .or_else(|| self.dotenv.get(key).map(String::as_str).filter(|v| !v.is_empty()))
            .map(str::to_string)
    }

    fn pick_bool(&self, key: &'static str) -> Result<bool, ConfigError> {
        match self.pick(key, None) {
            Some(raw) => parse_bool(key, &raw),
            None => Ok(false),
        }
    }
}

/// Parse an environment-style boolean.
pub fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: "expected one of 1/true/yes/on or 0/false/no/off".to_string(),
        }),
    }
}

fn validate_timeout(secs: f64, raw: &str) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidValue {
            key: ENV_TIMEOUT,
            value: raw.to_string(),
            reason: "timeout must be a positive number of seconds".to_string(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        key: ENV_TIMEOUT,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn validate_proxy(proxy: &str) -> Result<(), ConfigError> {
    reqwest::Proxy::all(proxy)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidValue {
            key: ENV_PROXY,
            value: proxy.to_string(),
            reason: e.to_string(),
        })
}

/// Snapshot of the process environment.
pub fn process_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Read a `.env` file without touching the process environment.
///
/// `None` reads `./.env` and treats a missing file as empty. An explicit path
/// that does not exist is an error.
pub fn load_dotenv(path: Option<&Path>) -> Result<HashMap<String, String>, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_DOTENV_FILE), false),
    };
    if !path.exists() && !required {
        return Ok(HashMap::new());
    }

    let invalid = |reason: String| ConfigError::InvalidValue {
        key: "env-file",
        value: path.display().to_string(),
        reason,
    };
    let iter = dotenvy::from_path_iter(path).map_err(|e| invalid(e.to_string()))?;
    let mut values = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| invalid(e.to_string()))?;
        values.insert(key, value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base_env() -> HashMap<String, String> {
        map(&[(ENV_TOKEN, "env-token"), (ENV_DST, "room-env")])
    }

    #[test]
    fn cli_beats_env_beats_dotenv() {
        let cli = CliOverrides {
            token: Some("cli-token".into()),
            ..Default::default()
        };
        let env = map(&[(ENV_TOKEN, "env-token"), (ENV_DST, "room-1")]);
        let dotenv = map(&[(ENV_TOKEN, "file-token"), (ENV_DST, "room-2")]);

        let cfg = resolve(&cli, &env, &dotenv).unwrap();
        assert_eq!(cfg.token(), "cli-token");
        assert_eq!(cfg.destination().value(), "room-1");

        let cfg = resolve(&CliOverrides::default(), &env, &dotenv).unwrap();
        assert_eq!(cfg.token(), "env-token");

        let cfg = resolve(&CliOverrides::default(), &HashMap::new(), &dotenv).unwrap();
        assert_eq!(cfg.token(), "file-token");
        assert_eq!(cfg.destination().value(), "room-2");
    }

    #[test]
    fn empty_values_fall_through() {
        let cli = CliOverrides {
            token: Some(String::new()),
            ..Default::default()
        };
        let env = map(&[(ENV_TOKEN, ""), (ENV_DST, "room")]);
        let dotenv = map(&[(ENV_TOKEN, "file-token")]);
        let cfg = resolve(&cli, &env, &dotenv).unwrap();
        assert_eq!(cfg.token(), "file-token");
    }

    #[test]
    fn missing_token_and_destination() {
        let err = resolve(&CliOverrides::default(), &HashMap::new(), &HashMap::new()).unwrap_err();
        assert_eq!(err, ConfigError::MissingRequired { key: ENV_TOKEN });

        let env = map(&[(ENV_TOKEN, "t")]);
        let err = resolve(&CliOverrides::default(), &env, &HashMap::new()).unwrap_err();
        assert_eq!(err, ConfigError::MissingRequired { key: ENV_DST });
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = resolve(&CliOverrides::default(), &base_env(), &HashMap::new()).unwrap();
        assert_eq!(cfg.format(), MessageFormat::Markdown);
        assert_eq!(cfg.timeout(), Duration::from_secs(10));
        assert!(!cfg.insecure_tls());
        assert!(!cfg.verbose());
        assert_eq!(cfg.proxy_url(), None);
    }

    #[test]
    fn precedence_is_per_field() {
        let cli = CliOverrides {
            format: Some("text".into()),
            ..Default::default()
        };
        let mut env = base_env();
        env.insert(ENV_TIMEOUT.into(), "3.5".into());
        let dotenv = map(&[(ENV_FORMAT, "markdown"), (ENV_TIMEOUT, "99")]);

        let cfg = resolve(&cli, &env, &dotenv).unwrap();
        assert_eq!(cfg.format(), MessageFormat::Text);
        assert_eq!(cfg.timeout(), Duration::from_secs_f64(3.5));
        assert_eq!(cfg.token(), "env-token");
    }

    #[test]
    fn cli_timeout_overrides_environment() {
        let cli = CliOverrides {
            timeout_secs: Some(2.0),
            ..Default::default()
        };
        let mut env = base_env();
        env.insert(ENV_TIMEOUT.into(), "not-a-number".into());
        let cfg = resolve(&cli, &env, &HashMap::new()).unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn invalid_timeout_and_format_are_rejected() {
        let mut env = base_env();
        env.insert(ENV_TIMEOUT.into(), "soon".into());
        let err = resolve(&CliOverrides::default(), &env, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_TIMEOUT, .. }));

        let cli = CliOverrides {
            timeout_secs: Some(0.0),
            ..Default::default()
        };
        let err = resolve(&cli, &base_env(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_TIMEOUT, .. }));

        let cli = CliOverrides {
            format: Some("html".into()),
            ..Default::default()
        };
        let err = resolve(&cli, &base_env(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_FORMAT, .. }));
    }

    #[test]
    fn boolean_flags_are_presence_based_on_cli() {
        let mut env = base_env();
        env.insert(ENV_INSECURE.into(), "no".into());
        let cli = CliOverrides {
            insecure: true,
            ..Default::default()
        };
        let cfg = resolve(&cli, &env, &HashMap::new()).unwrap();
        assert!(cfg.insecure_tls());

        let dotenv = map(&[(ENV_VERBOSE, "YES")]);
        let cfg = resolve(&CliOverrides::default(), &env, &dotenv).unwrap();
        assert!(cfg.verbose());
        assert!(!cfg.insecure_tls());
    }

    #[test]
    fn unparsable_boolean_is_an_error() {
        let mut env = base_env();
        env.insert(ENV_VERBOSE.into(), "maybe".into());
        let err = resolve(&CliOverrides::default(), &env, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_VERBOSE, .. }));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for raw in ["1", "true", "TRUE", "Yes", "on"] {
            assert_eq!(parse_bool(ENV_VERBOSE, raw), Ok(true), "{raw}");
        }
        for raw in ["0", "false", "No", "off", ""] {
            assert_eq!(parse_bool(ENV_VERBOSE, raw), Ok(false), "{raw}");
        }
        assert!(parse_bool(ENV_VERBOSE, "2").is_err());
    }

    #[test]
    fn destination_kind_is_resolved_once() {
        let env = map(&[(ENV_TOKEN, "t"), (ENV_DST, "user@example.com")]);
        let cfg = resolve(&CliOverrides::default(), &env, &HashMap::new()).unwrap();
        assert!(cfg.destination().is_email());
    }

    #[test]
    fn invalid_proxy_is_a_config_error() {
        let cli = CliOverrides {
            proxy: Some("not a url".into()),
            ..Default::default()
        };
        let err = resolve(&cli, &base_env(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_PROXY, .. }));

        let cli = CliOverrides {
            proxy: Some("http://proxy.local:3128".into()),
            ..Default::default()
        };
        let cfg = resolve(&cli, &base_env(), &HashMap::new()).unwrap();
        assert_eq!(cfg.proxy_url(), Some("http://proxy.local:3128"));
    }

    #[test]
    fn builder_round_trips_through_to_builder() {
        let cfg = Config::builder("tok", "room")
            .format(MessageFormat::Text)
            .timeout_secs(4.0)
            .verbose(true)
            .build()
            .unwrap();
        let rebuilt = cfg.to_builder().build().unwrap();
        assert_eq!(cfg, rebuilt);
    }

    #[test]
    fn load_dotenv_reads_file_without_touching_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "WEBEX_TOKEN=from-file").unwrap();
        writeln!(file, "WEBEX_DST=\"room-file\"").unwrap();

        let values = load_dotenv(Some(file.path())).unwrap();
        assert_eq!(values.get(ENV_TOKEN).map(String::as_str), Some("from-file"));
        assert_eq!(values.get(ENV_DST).map(String::as_str), Some("room-file"));
        assert_ne!(std::env::var(ENV_TOKEN).ok().as_deref(), Some("from-file"));
    }

    #[test]
    fn load_dotenv_requires_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.env");
        assert!(load_dotenv(Some(&missing)).is_err());
    }
}
