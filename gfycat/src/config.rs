//! Client configuration.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const API_BASE: &str = "https://api.gfycat.com/v1";
pub const UPLOAD_BASE: &str = "https://filedrop.gfycat.com/";
pub const AUTHORIZE_URL: &str = "https://gfycat.com/oauth/authorize";
/// Public site, used to build links to uploaded gfycats.
pub const GFYCAT_URL: &str = "https://gfycat.com";

/// Largest page the feed endpoints hand out per request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Everything a [`crate::Client`] needs to know up front.
///
/// Only the application credentials and the credentials file path are required; the rest
/// defaults to the public Gfycat endpoints and the timings the API is known to work well with.
///
/// ```rust
/// let config = gfycat::Config::builder()
///     .client_id("2_abcdef")
///     .client_secret("s3cr3t")
///     .credentials_path("creds.json")
///     .build()
///     .unwrap();
/// assert_eq!(config.page_size, 100);
/// ```
#[derive(Debug, Clone, Builder, Deserialize, Serialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Config {
    /// OAuth client id of the registered application.
    #[builder(setter(into))]
    pub client_id: String,

    #[builder(setter(into))]
    pub client_secret: String,

    /// JSON file the credential bundle is loaded from and persisted to.
    #[builder(setter(into))]
    pub credentials_path: PathBuf,

    #[builder(setter(into), default = "API_BASE.to_string()")]
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Host that receives the raw file bytes of an upload.
    #[builder(setter(into), default = "UPLOAD_BASE.to_string()")]
    #[serde(default = "default_upload_base")]
    pub upload_base: String,

    #[builder(setter(into), default = "AUTHORIZE_URL.to_string()")]
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    /// Loopback port of the authorization callback listener.
    ///
    /// Must match the redirect URI registered for the application,
    /// `http://localhost:<port>/callback`.
    #[builder(default = "8000")]
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    /// Open the authorization page in the user's browser. When off (or when no browser can be
    /// launched), the URL is only logged.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub open_browser: bool,

    /// How long to wait for the browser redirect. `None` waits forever.
    #[builder(setter(strip_option), default)]
    #[serde(default, with = "optional_seconds")]
    pub authorization_timeout: Option<Duration>,

    /// Items requested per feed page; also the modulus feed limits are rounded up to.
    #[builder(default = "MAX_PAGE_SIZE")]
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[builder(default = "Duration::from_secs(3)")]
    #[serde(default = "default_status_poll_interval", with = "seconds")]
    pub status_poll_interval: Duration,

    /// Upload status polls before giving up on seeing `complete`.
    #[builder(default = "30")]
    #[serde(default = "default_max_status_checks")]
    pub max_status_checks: usize,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Redirect target handed to the authorization endpoint.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.callback_port)
    }
}

impl ConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(id) = &self.client_id {
            if id.trim().is_empty() {
                return Err("client_id must not be empty".into());
            }
        }
        if let Some(page_size) = self.page_size {
            if page_size == 0 || page_size > MAX_PAGE_SIZE {
                return Err(format!(
                    "page_size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
                ));
            }
        }
        for url in [&self.api_base, &self.upload_base, &self.authorize_url]
            .into_iter()
            .flatten()
        {
            match url::Url::parse(url) {
                Ok(parsed) if !parsed.cannot_be_a_base() => {}
                Ok(_) => return Err(format!("{url} cannot be used as a base URL")),
                Err(e) => return Err(format!("{url} is not a valid URL: {e}")),
            }
        }
        Ok(())
    }
}

fn default_api_base() -> String {
    API_BASE.to_string()
}

fn default_upload_base() -> String {
    UPLOAD_BASE.to_string()
}

fn default_authorize_url() -> String {
    AUTHORIZE_URL.to_string()
}

fn default_callback_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_status_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_max_status_checks() -> usize {
    30
}

/// Durations are written as whole seconds in configuration files.
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = Config::builder()
            .client_id("id")
            .client_secret("secret")
            .credentials_path("creds.json")
            .build()
            .unwrap();
        assert_eq!(config.api_base, API_BASE);
        assert_eq!(config.upload_base, UPLOAD_BASE);
        assert_eq!(config.callback_port, 8000);
        assert_eq!(config.redirect_uri(), "http://localhost:8000/callback");
        assert!(config.open_browser);
        assert_eq!(config.authorization_timeout, None);
        assert_eq!(config.status_poll_interval, Duration::from_secs(3));
        assert_eq!(config.max_status_checks, 30);
    }

    #[test]
    fn builder_rejects_bad_values() {
        let err = Config::builder()
            .client_id("id")
            .client_secret("secret")
            .credentials_path("creds.json")
            .page_size(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("page_size"), "{err}");

        let err = Config::builder()
            .client_id("id")
            .client_secret("secret")
            .credentials_path("creds.json")
            .api_base("not a url")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not a valid URL"), "{err}");

        assert!(
            Config::builder()
                .client_secret("secret")
                .credentials_path("creds.json")
                .build()
                .is_err()
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            client_id = "id"
            client_secret = "secret"
            credentials_path = "creds.json"
            authorization_timeout = 120
            status_poll_interval = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.authorization_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.status_poll_interval, Duration::from_secs(1));
        assert_eq!(config.page_size, MAX_PAGE_SIZE);
        assert_eq!(config.authorize_url, AUTHORIZE_URL);
    }
}
