//! The raw HTTP seam between the client and the network.
//!
//! [`Transport`] moves exactly one request over the wire and hands back the status, content
//! type and body untouched. Everything Gfycat-specific (bearer tokens, refresh-and-retry, error
//! mapping) sits above it in the session layer, so swapping the transport (for example with
//! [`crate::mock::MockTransport`] in tests) never changes client behavior.

use crate::error::Result;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use url::Url;

/// One fully-resolved outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    /// Bearer token to send in the `Authorization` header, if any.
    pub bearer: Option<String>,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Self {
            method,
            url,
            query: Vec::new(),
            headers,
            bearer: None,
            body: Body::Empty,
        }
    }

    /// Looks up a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Request payloads the Gfycat API needs.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartForm),
}

/// A `multipart/form-data` body with plain text fields and at most one file.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

#[derive(Clone)]
pub struct FilePart {
    /// Form field name the file is sent under.
    pub field: String,
    pub file_name: String,
    pub bytes: Bytes,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl MultipartForm {
    fn into_reqwest(self) -> reqwest::multipart::Form {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        if let Some(file) = self.file {
            let len = file.bytes.len() as u64;
            let part = reqwest::multipart::Part::stream_with_length(file.bytes, len)
                .file_name(file.file_name);
            form = form.part(file.field, part);
        }
        form
    }
}

/// What came back over the wire, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// A decoded response body.
///
/// Gfycat answers with JSON on most endpoints, but some (uploads, title changes) return an empty
/// or plain-text body, and a few send JSON without saying so.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Json(serde_json::Value),
    Text(String),
}

impl Content {
    /// Decodes a body according to its content type.
    pub fn decode(response: &RawResponse) -> Result<Self> {
        let is_json = response
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
        if is_json && !response.body.is_empty() {
            Ok(Content::Json(serde_json::from_slice(&response.body)?))
        } else {
            Ok(Content::Text(
                String::from_utf8_lossy(&response.body).into_owned(),
            ))
        }
    }

    /// Decodes the body of a failed response.
    ///
    /// Error pages do not always match their content type (a proxy's HTML page sent as
    /// `application/json`, a truncated body), so anything that fails to parse is kept as text.
    pub fn decode_lossy(response: &RawResponse) -> Self {
        Self::decode(response)
            .unwrap_or_else(|_| Content::Text(String::from_utf8_lossy(&response.body).into_owned()))
    }

    /// Deserializes the content into `T`, parsing text bodies as JSON.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Content::Json(value) => Ok(serde_json::from_value(value)?),
            Content::Text(text) => Ok(serde_json::from_str(&text)?),
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Json(value) => write!(f, "{value}"),
            Content::Text(text) => f.write_str(text),
        }
    }
}

/// Sends a single HTTP request.
///
/// Implementations must not retry, follow authentication flows, or interpret status codes; they
/// only report what the server said.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: HttpRequest) -> impl Future<Output = Result<RawResponse>> + Send;
}

/// The production [`Transport`], backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(concat!("gfycat-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Uses an existing client, e.g. one configured with a proxy.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    #[tracing::instrument(skip_all, fields(method = %request.method, url = %request.url), level = tracing::Level::TRACE)]
    async fn send(&self, request: HttpRequest) -> Result<RawResponse> {
        let HttpRequest {
            method,
            url,
            query,
            headers,
            bearer,
            body,
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Multipart(form) => builder.multipart(form.into_reqwest()),
        };

        let response = builder.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;
        tracing::trace!(%status, len = body.len(), "received response");

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(content_type: Option<&str>, body: &'static str) -> RawResponse {
        RawResponse {
            status: StatusCode::OK,
            content_type: content_type.map(str::to_owned),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn decodes_json_with_charset() {
        let content = Content::decode(&raw(Some("application/json; charset=utf-8"), r#"{"a":1}"#))
            .unwrap();
        assert_eq!(content, Content::Json(json!({"a": 1})));
    }

    #[test]
    fn non_json_content_types_stay_text() {
        let content = Content::decode(&raw(Some("text/html"), "<h1>hi</h1>")).unwrap();
        assert_eq!(content, Content::Text("<h1>hi</h1>".into()));

        let content = Content::decode(&raw(None, "")).unwrap();
        assert_eq!(content, Content::Text(String::new()));
    }

    #[test]
    fn empty_json_body_is_text() {
        let content = Content::decode(&raw(Some("application/json"), "")).unwrap();
        assert_eq!(content, Content::Text(String::new()));
    }

    #[test]
    fn text_bodies_can_still_be_deserialized() {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }
        let named: Named = Content::Text(r#"{"name":"x"}"#.into()).deserialize().unwrap();
        assert_eq!(named.name, "x");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = Content::decode(&raw(Some("application/json"), "{")).unwrap_err();
        assert!(matches!(err, crate::Error::Json(_)));
    }

    #[tokio::test]
    async fn multipart_files_go_out_named_and_sized() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0; 4096];
            // The closing multipart boundary ends in `--\r\n`.
            while !received.ends_with(b"--\r\n") {
                let n = conn.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before the body was complete");
                received.extend_from_slice(&buf[..n]);
            }
            conn.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });

        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let mut request = HttpRequest::new(Method::POST, url);
        request.body = Body::Multipart(MultipartForm {
            fields: vec![("key".into(), "abc123".into())],
            file: Some(FilePart {
                field: "file".into(),
                file_name: "clip.mp4".into(),
                bytes: Bytes::from_static(b"not really a video"),
            }),
        });
        let response = ReqwestTransport::new().unwrap().send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let received = server.await.unwrap();
        let headers = received.to_ascii_lowercase();
        assert!(headers.contains("content-length:"), "{received}");
        assert!(!headers.contains("transfer-encoding: chunked"), "{received}");
        assert!(received.contains(r#"name="key""#), "{received}");
        assert!(received.contains(r#"name="file"; filename="clip.mp4""#), "{received}");
        assert!(received.contains("not really a video"), "{received}");
    }

    #[test]
    fn lossy_decoding_keeps_malformed_bodies_as_text() {
        let response = raw(Some("application/json"), "<html>502 Bad Gateway</html>");
        assert_eq!(
            Content::decode_lossy(&response),
            Content::Text("<html>502 Bad Gateway</html>".into())
        );

        let response = raw(Some("application/json"), r#"{"errorMessage":"nope"}"#);
        assert_eq!(
            Content::decode_lossy(&response),
            Content::Json(json!({"errorMessage": "nope"}))
        );
    }
}
