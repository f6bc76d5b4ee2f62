//! A blocking wrapper around the async [`crate::Client`].
//!
//! Every method has the same contract as its async counterpart. The wrapper owns a
//! current-thread tokio runtime and drives each call to completion on it, so it must not be used
//! from within another async runtime.

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::feed::FeedQuery;
use crate::models::{Follower, FollowerProfile, Gfy, UploadStatus, User};
use crate::transport::{ReqwestTransport, Transport};
use crate::upload::UploadOptions;
use std::path::Path;
use tokio::runtime::Runtime;
use tokio_stream::StreamExt;
use url::Url;

/// Blocking client for the Gfycat API.
#[derive(Debug)]
pub struct Client<T = ReqwestTransport> {
    inner: crate::Client<T>,
    runtime: Runtime,
}

impl Client<ReqwestTransport> {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_transport(config, ReqwestTransport::new()?)
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: Config, transport: T) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::io("start tokio runtime", e))?;
        let inner = crate::Client::with_transport(config, transport)?;
        Ok(Self { inner, runtime })
    }

    /// The async client this one drives.
    pub fn as_async(&self) -> &crate::Client<T> {
        &self.inner
    }

    /// See [`crate::Client::authenticate`].
    pub fn authenticate(&self) -> Result<()> {
        self.runtime.block_on(self.inner.authenticate())
    }

    pub fn credentials(&self) -> Credentials {
        self.runtime.block_on(self.inner.credentials())
    }

    pub fn authorization_url(&self) -> Url {
        self.inner.authorization_url()
    }

    pub fn get_me(&self) -> Result<User> {
        self.runtime.block_on(self.inner.get_me())
    }

    pub fn get_user(&self, user_id: &str) -> Result<User> {
        self.runtime.block_on(self.inner.get_user(user_id))
    }

    pub fn get_gfycat(&self, gfy_id: &str) -> Result<Gfy> {
        self.runtime.block_on(self.inner.get_gfycat(gfy_id))
    }

    pub fn set_title(&self, gfy_id: &str, title: &str) -> Result<()> {
        self.runtime.block_on(self.inner.set_title(gfy_id, title))
    }

    pub fn delete_title(&self, gfy_id: &str) -> Result<()> {
        self.runtime.block_on(self.inner.delete_title(gfy_id))
    }

    pub fn delete_gfycat(&self, gfy_id: &str) -> Result<()> {
        self.runtime.block_on(self.inner.delete_gfycat(gfy_id))
    }

    pub fn get_followers(&self) -> Result<Vec<Follower>> {
        self.runtime.block_on(self.inner.get_followers())
    }

    pub fn get_followers_with_users(&self) -> Result<Vec<FollowerProfile>> {
        self.runtime.block_on(self.inner.get_followers_with_users())
    }

    pub fn upload_status(&self, key: &str) -> Result<UploadStatus> {
        self.runtime.block_on(self.inner.upload_status(key))
    }

    /// See [`crate::Client::get_feed`].
    pub fn get_feed(&self, user_id: Option<&str>, query: FeedQuery) -> Result<Vec<Gfy>> {
        self.runtime.block_on(self.inner.get_feed(user_id, query))
    }

    pub fn get_own_feed(&self, query: FeedQuery) -> Result<Vec<Gfy>> {
        self.runtime.block_on(self.inner.get_own_feed(query))
    }

    /// Iterates over a feed, fetching a page whenever the previous one is used up.
    ///
    /// See [`crate::Client::feed_stream`].
    pub fn feed_iter<'a>(
        &'a self,
        user_id: Option<&str>,
        per_request: usize,
    ) -> Result<impl Iterator<Item = Result<Gfy>> + use<'a, T>> {
        let mut stream = Box::pin(self.inner.feed_stream(user_id, per_request)?);
        Ok(std::iter::from_fn(move || self.runtime.block_on(stream.next())))
    }

    /// See [`crate::Client::upload_from_file`].
    pub fn upload_from_file(
        &self,
        path: impl AsRef<Path>,
        options: UploadOptions,
    ) -> Result<Option<Gfy>> {
        self.runtime.block_on(self.inner.upload_from_file(path, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockTransport};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn client(dir: &tempfile::TempDir) -> (Client<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let client =
            Client::with_transport(mock::config(dir.path().join("creds.json")), transport.clone())
                .unwrap();
        (client, transport)
    }

    #[test]
    fn calls_block_until_done() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_json(200, json!({"userid": "me", "username": "me", "views": "12"}));

        let me = client.get_me().unwrap();
        assert_eq!(me.username, "me");
        assert_eq!(me.views, 12);
    }

    #[test]
    fn authenticate_refreshes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        let path = dir.path().join("creds.json");
        client.runtime.block_on(mock::write_credentials(&path, "r0"));
        transport.push_json(200, mock::token_json("a1", "r1"));

        client.authenticate().unwrap();
        assert_eq!(client.credentials().access_token(), Some("a1"));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn unauthorized_calls_are_retried_after_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        let path = dir.path().join("creds.json");
        client.runtime.block_on(mock::write_credentials(&path, "r0"));
        transport.push_json(200, mock::token_json("a1", "r1"));
        transport.push_json(401, json!({"message": "Unauthorized"}));
        transport.push_json(200, mock::token_json("a2", "r2"));
        transport.push_json(200, mock::gfy_json("abc123"));

        client.authenticate().unwrap();
        let gfy = client.get_gfycat("abc123").unwrap();
        assert_eq!(gfy.gfy_id, "abc123");

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[1].bearer.as_deref(), Some("a1"));
        assert_eq!(requests[3].bearer.as_deref(), Some("a2"));
    }

    #[test]
    fn feed_iter_walks_pages() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_json(200, mock::feed_page("a", 20, "c1"));
        transport.push_json(200, mock::feed_page("b", 3, "c2"));

        let items: Vec<Gfy> = client
            .feed_iter(None, 20)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(items.len(), 23);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn upload_validation_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        let options = UploadOptions::default().tags((0..21).map(|i| i.to_string()));

        let err = client
            .upload_from_file(dir.path().join("clip.mp4"), options)
            .unwrap_err();
        assert!(matches!(err, Error::TooManyTags { .. }));
        assert_eq!(transport.request_count(), 0);
    }
}
