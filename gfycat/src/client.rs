//! The async Gfycat client.

use crate::config::{Config, MAX_PAGE_SIZE};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::models::{
    Follower, FollowerProfile, FollowersResponse, Gfy, GfyItemResponse, UploadStatus, User,
};
use crate::oauth::TokenManager;
use crate::route::Route;
use crate::session::{Call, Session};
use crate::transport::{Body, ReqwestTransport, Transport};
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use url::Url;

/// Client for the Gfycat API.
///
/// Cheap to clone; clones share the credential bundle and the underlying transport. Call
/// [`Client::authenticate`] once before making authorized calls. Any call the API rejects for
/// lack of authorization is retried once after a token refresh.
///
/// ```rust,no_run
/// # async fn demo() -> gfycat::Result<()> {
/// let config = gfycat::Config::builder()
///     .client_id("2_abcdef")
///     .client_secret("s3cr3t")
///     .credentials_path("creds.json")
///     .build()
///     .expect("valid config");
/// let client = gfycat::Client::new(config)?;
/// client.authenticate().await?;
/// let me = client.get_me().await?;
/// println!("logged in as {}", me.username);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client<T = ReqwestTransport> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Inner<T> {
    pub(crate) session: Session<T>,
    pub(crate) api_base: Url,
    pub(crate) upload_base: Url,
    pub(crate) page_size: usize,
    pub(crate) status_poll_interval: Duration,
    pub(crate) max_status_checks: usize,
}

impl Client<ReqwestTransport> {
    /// Creates a client talking to Gfycat over HTTPS.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_transport(config, ReqwestTransport::new()?)
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client that sends its requests through `transport`.
    pub fn with_transport(config: Config, transport: T) -> Result<Self> {
        // Deserialized configs never went through the builder's checks.
        if config.page_size == 0 || config.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidPageSize {
                requested: config.page_size,
                min: 1,
                max: MAX_PAGE_SIZE,
            });
        }
        let api_base = parse_base(&config.api_base)?;
        let upload_base = parse_base(&config.upload_base)?;
        let tokens = TokenManager::new(&config, &api_base)?;

        Ok(Self {
            inner: Arc::new(Inner {
                session: Session { transport, tokens },
                api_base,
                upload_base,
                page_size: config.page_size,
                status_poll_interval: config.status_poll_interval,
                max_status_checks: config.max_status_checks,
            }),
        })
    }

    pub(crate) fn route(&self, method: Method, segments: &[&str]) -> Route {
        Route::api(&self.inner.api_base, method, segments)
    }

    pub(crate) fn session(&self) -> &Session<T> {
        &self.inner.session
    }

    /// Loads the stored credentials and brings them up to date.
    ///
    /// Creates the credentials file if it does not exist yet. The stored refresh token is
    /// exchanged for a fresh bundle; if there is none, or Gfycat reports it as
    /// `InvalidRefreshToken`, the user is walked through the browser authorization flow. The
    /// resulting bundle is written back to the credentials file.
    pub async fn authenticate(&self) -> Result<()> {
        self.session().tokens.authenticate(&self.session().transport).await
    }

    /// A snapshot of the current credential bundle.
    pub async fn credentials(&self) -> Credentials {
        self.session().tokens.credentials().await
    }

    /// URL of the page the user grants this application access on.
    pub fn authorization_url(&self) -> Url {
        self.session().tokens.authorization_url()
    }

    /// The authenticated user.
    #[instrument(skip(self))]
    pub async fn get_me(&self) -> Result<User> {
        let call = Call::new(self.route(Method::GET, &["me"]));
        self.session().request_json(&call).await
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        let call = Call::new(self.route(Method::GET, &["users", user_id]));
        self.session().request_json(&call).await
    }

    #[instrument(skip(self))]
    pub async fn get_gfycat(&self, gfy_id: &str) -> Result<Gfy> {
        let call = Call::new(self.route(Method::GET, &["gfycats", gfy_id]));
        let response: GfyItemResponse = self.session().request_json(&call).await?;
        Ok(response.gfy_item)
    }

    /// Sets the title of one of the authenticated user's gfycats.
    #[instrument(skip(self))]
    pub async fn set_title(&self, gfy_id: &str, title: &str) -> Result<()> {
        let call = Call::new(self.route(Method::PUT, &["me", "gfycats", gfy_id, "title"]))
            .body(Body::Json(serde_json::json!({ "value": title })));
        self.session().request(&call).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_title(&self, gfy_id: &str) -> Result<()> {
        let call = Call::new(self.route(Method::DELETE, &["me", "gfycats", gfy_id, "title"]));
        self.session().request(&call).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_gfycat(&self, gfy_id: &str) -> Result<()> {
        let call = Call::new(self.route(Method::DELETE, &["me", "gfycats", gfy_id]));
        self.session().request(&call).await?;
        tracing::info!(gfy_id, "deleted gfycat");
        Ok(())
    }

    /// Users following the authenticated user.
    #[instrument(skip(self))]
    pub async fn get_followers(&self) -> Result<Vec<Follower>> {
        let call = Call::new(self.route(Method::GET, &["me", "followers"]));
        let response: FollowersResponse = self.session().request_json(&call).await?;
        Ok(response.followers)
    }

    /// Like [`Client::get_followers`], with each follower's full profile.
    ///
    /// Profiles are fetched one at a time, so this makes one request per follower.
    #[instrument(skip(self))]
    pub async fn get_followers_with_users(&self) -> Result<Vec<FollowerProfile>> {
        let followers = self.get_followers().await?;
        let mut profiles = Vec::with_capacity(followers.len());
        for follower in followers {
            let user = self.get_user(&follower.follower_id).await?;
            profiles.push(FollowerProfile {
                user,
                follow_date: follower.follow_date,
            });
        }
        Ok(profiles)
    }

    /// Processing state of an upload.
    #[instrument(skip(self))]
    pub async fn upload_status(&self, key: &str) -> Result<UploadStatus> {
        let call = Call::new(self.route(Method::GET, &["gfycats", "fetch", "status", key]));
        self.session().request_json(&call).await
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|source| Error::InvalidUrl {
        url: raw.to_owned(),
        source,
    })?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl {
            url: raw.to_owned(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockTransport};
    use crate::transport::Body;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn client(dir: &tempfile::TempDir) -> (Client<MockTransport>, MockTransport) {
        mock::client(dir.path().join("creds.json")).unwrap()
    }

    #[test]
    fn deserialized_configs_are_still_checked() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mock::config(dir.path().join("creds.json"));
        config.page_size = 500;
        let err = Client::with_transport(config, MockTransport::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidPageSize { requested: 500, .. }));

        let mut config = mock::config(dir.path().join("creds.json"));
        config.api_base = "mailto:nobody@example.com".into();
        let err = Client::with_transport(config, MockTransport::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn get_gfycat_unwraps_item() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_json(200, mock::gfy_json("abc123"));

        let gfy = client.get_gfycat("abc123").await.unwrap();
        assert_eq!(gfy.gfy_id, "abc123");
        assert_eq!(gfy.url(), "https://gfycat.com/abc123");

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url.as_str(), "https://api.gfycat.com/v1/gfycats/abc123");
    }

    #[tokio::test]
    async fn title_updates_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_text(200, "");
        transport.push_text(200, "");
        transport.push_text(200, "");

        client.set_title("abc", "new title").await.unwrap();
        client.delete_title("abc").await.unwrap();
        client.delete_gfycat("abc").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].url.path(), "/v1/me/gfycats/abc/title");
        let Body::Json(body) = &requests[0].body else {
            panic!("title update without JSON body");
        };
        assert_eq!(body, &json!({"value": "new title"}));
        assert_eq!(requests[1].method, Method::DELETE);
        assert_eq!(requests[1].url.path(), "/v1/me/gfycats/abc/title");
        assert_eq!(requests[2].method, Method::DELETE);
        assert_eq!(requests[2].url.path(), "/v1/me/gfycats/abc");
    }

    #[tokio::test]
    async fn followers_are_paired_with_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_json(
            200,
            json!({"followers": [
                {"follower_id": "alice", "follow_date": "1500000000"},
                {"follower_id": "bob", "follow_date": 1500000100},
            ]}),
        );
        transport.push_json(200, json!({"userid": "alice", "username": "alice"}));
        transport.push_json(200, json!({"userid": "bob", "username": "bob"}));

        let profiles = client.get_followers_with_users().await.unwrap();
        let names: Vec<_> = profiles.iter().map(|p| p.user.username.as_str()).collect();
        assert_eq!(names, ["alice", "bob"]);
        assert_eq!(profiles[1].follow_date.as_deref(), Some("1500000100"));

        let paths: Vec<_> = transport
            .requests()
            .iter()
            .map(|r| r.url.path().to_owned())
            .collect();
        assert_eq!(paths, ["/v1/me/followers", "/v1/users/alice", "/v1/users/bob"]);
    }

    #[tokio::test]
    async fn api_errors_surface_with_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_json(404, json!({"errorMessage": "gfycat not found"}));

        let err = client.get_gfycat("nope").await.unwrap_err();
        assert_eq!(err.status(), Some(http::StatusCode::NOT_FOUND));
        assert!(err.to_string().contains("gfycat not found"), "{err}");
    }
}
