use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

pub const WEBEX_API_MESSAGES: &str = "https://webexapis.com/v1/messages";
pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_DOTENV_FILE: &str = ".env";

pub const ENV_TOKEN: &str = "WEBEX_TOKEN";
pub const ENV_DST: &str = "WEBEX_DST";
pub const ENV_FORMAT: &str = "WEBEX_FORMAT";
pub const ENV_TIMEOUT: &str = "WEBEX_TIMEOUT";
pub const ENV_INSECURE: &str = "WEBEX_INSECURE";
pub const ENV_VERBOSE: &str = "WEBEX_VERBOSE";
pub const ENV_PROXY: &str = "WEBEX_PROXY";

// Multipart field name Webex expects for an attachment
pub const FILES_FIELD: &str = "files";
pub const FALLBACK_FILENAME: &str = "download";
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

pub const USER_AGENT: &str = concat!("webex-notify-rs/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("user-agent", USER_AGENT),
    ("accept", "application/json"),
];

pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (k, v) in DEFAULT_HEADERS {
        let name = HeaderName::from_static(k);
        if let Ok(val) = HeaderValue::from_str(v) {
            headers.insert(name, val);
        }
    }
    headers
}

pub fn default_timeout() -> Duration {
    Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_headers_carry_user_agent() {
        let headers = default_headers();
        let ua = headers.get("user-agent").unwrap().to_str().unwrap();
        assert!(ua.starts_with("webex-notify-rs/"));
        assert_eq!(headers.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn default_timeout_is_ten_seconds() {
        assert_eq!(default_timeout(), Duration::from_secs(10));
    }
}
