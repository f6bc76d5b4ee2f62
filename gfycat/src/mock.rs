//! Scripted transport for testing code built on the client.
//!
//! [`MockTransport`] answers requests from a queue of canned responses, in order, and keeps a
//! log of every request it was handed so tests can assert on methods, URLs, bearer tokens and
//! bodies. It never touches the network.
//!
//! Available to unit tests and, with the `mock` feature, to downstream crates.

use crate::client::Client;
use crate::config::Config;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::Result;
use crate::transport::{HttpRequest, RawResponse, Transport};
use bytes::Bytes;
use http::StatusCode;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<RawResponse>,
    requests: Vec<HttpRequest>,
}

/// A [`Transport`] that replays queued responses.
///
/// Clones share the same queue and request log.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, response: RawResponse) {
        self.script().responses.push_back(response);
    }

    /// Queues a JSON response with the given status.
    pub fn push_json(&self, status: u16, body: Value) {
        self.push(RawResponse {
            status: status_code(status),
            content_type: Some("application/json".to_owned()),
            body: Bytes::from(body.to_string()),
        });
    }

    pub fn push_text(&self, status: u16, body: &str) {
        self.push(RawResponse {
            status: status_code(status),
            content_type: Some("text/plain".to_owned()),
            body: Bytes::from(body.to_owned()),
        });
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script().requests.len()
    }

    /// Responses queued but not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script().responses.len()
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or_else(|_| panic!("{status} is not an HTTP status"))
}

impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<RawResponse> {
        let mut script = self.script();
        tracing::trace!(method = %request.method, url = %request.url, "mock transport received request");
        let summary = format!("{} {}", request.method, request.url);
        script.requests.push(request);
        match script.responses.pop_front() {
            Some(response) => Ok(response),
            None => panic!("mock transport has no response queued for {summary}"),
        }
    }
}

/// A configuration for tests: fake application credentials, no browser, no poll delay.
pub fn config(credentials_path: impl Into<PathBuf>) -> Config {
    Config {
        client_id: "test-client".to_owned(),
        client_secret: "test-secret".to_owned(),
        credentials_path: credentials_path.into(),
        api_base: crate::config::API_BASE.to_owned(),
        upload_base: crate::config::UPLOAD_BASE.to_owned(),
        authorize_url: crate::config::AUTHORIZE_URL.to_owned(),
        callback_port: 8000,
        open_browser: false,
        authorization_timeout: Some(Duration::from_secs(1)),
        page_size: crate::config::MAX_PAGE_SIZE,
        status_poll_interval: Duration::ZERO,
        max_status_checks: 30,
    }
}

/// A client wired to a fresh [`MockTransport`] using [`config`].
pub fn client(credentials_path: impl Into<PathBuf>) -> Result<(Client<MockTransport>, MockTransport)> {
    let transport = MockTransport::new();
    let client = Client::with_transport(config(credentials_path), transport.clone())?;
    Ok((client, transport))
}

/// A token endpoint response.
pub fn token_json(access_token: &str, refresh_token: &str) -> Value {
    json!({
        "token_type": "bearer",
        "scope": "all",
        "access_token": access_token,
        "expires_in": 3600,
        "refresh_token": refresh_token,
        "refresh_token_expires_in": 5_184_000,
        "resource_owner": "tester",
    })
}

/// A `GET /gfycats/{id}` response.
pub fn gfy_json(id: &str) -> Value {
    json!({ "gfyItem": gfy_item(id, 0) })
}

/// A single item as it appears in feeds and `gfyItem` wrappers.
pub fn gfy_item(id: &str, views: u64) -> Value {
    json!({
        "gfyId": id,
        "gfyName": id,
        "gfyNumber": "123456",
        "title": format!("title of {id}"),
        "tags": ["test"],
        "views": views,
        "likes": "0",
        "dislikes": "0",
        "createDate": 1_500_000_000,
        "mp4Size": 1024,
        "gatekeeper": 0,
        "mp4Url": format!("https://giant.gfycat.com/{id}.mp4"),
        "userName": "tester",
    })
}

/// A feed page with `count` items named `{prefix}{n}`.
pub fn feed_page(prefix: &str, count: usize, cursor: &str) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|n| gfy_item(&format!("{prefix}{n}"), n as u64))
        .collect();
    json!({ "gfycats": items, "cursor": cursor })
}

/// Writes a credentials file holding only a refresh token.
pub async fn write_credentials(path: impl AsRef<Path>, refresh_token: &str) {
    let credentials = Credentials {
        refresh_token: Some(refresh_token.to_owned()),
        ..Default::default()
    };
    if let Err(e) = CredentialStore::new(path.as_ref()).save(&credentials).await {
        panic!("could not write test credentials: {e}");
    }
}
