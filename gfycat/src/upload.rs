//! File uploads.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::models::{Gfy, UploadKeyResponse};
use crate::route::Route;
use crate::session::Call;
use crate::transport::{Body, FilePart, MultipartForm, Transport};
use bytes::Bytes;
use http::Method;
use std::path::Path;
use tracing::instrument;

/// Most tags a single upload may carry.
pub const MAX_TAGS: usize = 20;

/// Settings for [`Client::upload_from_file`].
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub title: String,
    pub tags: Vec<String>,
    pub keep_audio: bool,
    /// Ask Gfycat to reject files it has seen before.
    pub check_duplicate: bool,
    /// Wait for processing to finish and return the resulting gfycat.
    pub check_upload: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            tags: Vec::new(),
            keep_audio: true,
            check_duplicate: false,
            check_upload: true,
        }
    }
}

impl UploadOptions {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn keep_audio(mut self, keep_audio: bool) -> Self {
        self.keep_audio = keep_audio;
        self
    }

    pub fn check_duplicate(mut self, check_duplicate: bool) -> Self {
        self.check_duplicate = check_duplicate;
        self
    }

    pub fn check_upload(mut self, check_upload: bool) -> Self {
        self.check_upload = check_upload;
        self
    }
}

impl<T: Transport> Client<T> {
    /// Uploads a video file.
    ///
    /// Reserves an upload key, sends the file to the ingest host and, unless
    /// [`UploadOptions::check_upload`] is off, polls the processing status until Gfycat reports
    /// it complete or the configured number of checks runs out. The finished gfycat is then
    /// fetched and returned.
    ///
    /// Returns `Ok(None)` when checks are skipped, and when the final fetch is rejected by the
    /// API: at that point the file was accepted, it just could not be confirmed.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn upload_from_file(
        &self,
        path: impl AsRef<Path>,
        options: UploadOptions,
    ) -> Result<Option<Gfy>> {
        let path = path.as_ref();
        if options.tags.len() > MAX_TAGS {
            return Err(Error::TooManyTags {
                supplied: options.tags.len(),
                max: MAX_TAGS,
            });
        }

        // Read up front so a bad path never burns an upload key, and so the file is closed
        // before any request goes out.
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::io(format!("read {}", path.display()), e))?;

        let key = self.reserve_upload_key(&options).await?;
        tracing::debug!(%key, "reserved upload key");
        let file_name = path
            .file_name()
            .map_or_else(|| key.clone(), |name| name.to_string_lossy().into_owned());
        self.push_file(&key, file_name, Bytes::from(bytes)).await?;

        let url = format!("{}/{key}", crate::config::GFYCAT_URL);
        if !options.check_upload {
            tracing::info!(%url, "file uploaded, checks have been skipped");
            return Ok(None);
        }

        self.wait_for_processing(&key).await?;
        match self.get_gfycat(&key).await {
            Ok(gfy) => {
                tracing::info!(%url, "file uploaded");
                Ok(Some(gfy))
            }
            Err(e @ Error::Api { .. }) => {
                tracing::warn!(
                    %url,
                    error = %e,
                    "file has probably been uploaded, but the check was unsuccessful"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Asks Gfycat for a fresh upload key, registering title, tags and audio settings with it.
    ///
    /// An empty key in an otherwise successful response is an [`Error::UnexpectedResponse`].
    async fn reserve_upload_key(&self, options: &UploadOptions) -> Result<String> {
        let call = Call::new(self.route(Method::POST, &["gfycats"])).body(Body::Json(
            serde_json::json!({
                "title": options.title,
                "tags": options.tags,
                "keepAudio": options.keep_audio,
                "noMd5": !options.check_duplicate,
            }),
        ));
        let response: UploadKeyResponse = self.session().request_json(&call).await?;
        if response.gfyname.is_empty() {
            return Err(Error::UnexpectedResponse {
                route: "POST /gfycats".into(),
                reason: "empty upload key".into(),
            });
        }
        Ok(response.gfyname)
    }

    /// Sends the file bytes to the ingest host under a reserved `key`.
    ///
    /// # Arguments
    ///
    /// * `key` - the reserved upload key, sent as the `key` field.
    /// * `file_name` - the local file's name, sent as the part's `filename`.
    /// * `bytes` - the whole file.
    ///
    /// The ingest host does not take bearer tokens, so the first attempt goes out without one.
    async fn push_file(&self, key: &str, file_name: String, bytes: Bytes) -> Result<()> {
        let form = MultipartForm {
            fields: vec![("key".into(), key.into())],
            file: Some(FilePart {
                field: "file".into(),
                file_name,
                bytes,
            }),
        };
        let route = Route::custom(Method::POST, self.inner.upload_base.clone());
        let call = Call::new(route).body(Body::Multipart(form)).no_auth();
        self.session().request(&call).await?;
        Ok(())
    }

    /// Polls the processing status of `key` until Gfycat reports it `complete`.
    ///
    /// Checks are spaced by the configured poll interval, with no sleep after the last one.
    ///
    /// # Returns
    ///
    /// `Ok(())` both when processing completed and when the configured number of checks ran out;
    /// the caller tries to fetch the gfycat either way. Only a failed status request is an error.
    async fn wait_for_processing(&self, key: &str) -> Result<()> {
        let max_checks = self.inner.max_status_checks;
        for check in 1..=max_checks {
            let status = self.upload_status(key).await?;
            tracing::debug!(check, task = %status.task, "upload status");
            if status.is_complete() {
                return Ok(());
            }
            if check < max_checks {
                tokio::time::sleep(self.inner.status_poll_interval).await;
            }
        }
        tracing::warn!(
            %key,
            max_checks,
            "upload not reported complete, checking for the gfycat anyway"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockTransport};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;

    fn client(dir: &tempfile::TempDir) -> (Client<MockTransport>, MockTransport) {
        mock::client(dir.path().join("creds.json")).unwrap()
    }

    fn video(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    #[tokio::test]
    async fn uploads_and_waits_for_completion() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_json(200, json!({"isOk": true, "gfyname": "abc123"}));
        transport.push_text(200, "");
        transport.push_json(200, json!({"task": "encoding"}));
        transport.push_json(200, json!({"task": "encoding"}));
        transport.push_json(200, json!({"task": "complete", "gfyname": "abc123"}));
        transport.push_json(200, mock::gfy_json("abc123"));

        let options = UploadOptions::default()
            .title("my clip")
            .tags(["one", "two"])
            .check_duplicate(true);
        let gfy = client
            .upload_from_file(video(&dir), options)
            .await
            .unwrap()
            .expect("upload confirmed");
        assert_eq!(gfy.gfy_id, "abc123");

        let requests = transport.requests();
        assert_eq!(requests.len(), 6);

        let Body::Json(reserve) = &requests[0].body else {
            panic!("key reservation without JSON body");
        };
        assert_eq!(requests[0].url.path(), "/v1/gfycats");
        assert_eq!(
            reserve,
            &json!({"title": "my clip", "tags": ["one", "two"], "keepAudio": true, "noMd5": false})
        );

        assert_eq!(requests[1].url.as_str(), "https://filedrop.gfycat.com/");
        assert_eq!(requests[1].bearer, None);
        let Body::Multipart(form) = &requests[1].body else {
            panic!("ingest without multipart body");
        };
        assert_eq!(form.fields, [("key".to_string(), "abc123".to_string())]);
        let file = form.file.as_ref().unwrap();
        assert_eq!(file.file_name, "clip.mp4");
        assert_eq!(&file.bytes[..], b"not really a video");

        let polls = requests
            .iter()
            .filter(|r| r.url.path() == "/v1/gfycats/fetch/status/abc123")
            .count();
        assert_eq!(polls, 3);
        assert_eq!(requests[5].url.path(), "/v1/gfycats/abc123");
    }

    #[tokio::test]
    async fn exhausted_checks_and_failed_fetch_is_unconfirmed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mock::config(dir.path().join("creds.json"));
        config.max_status_checks = 2;
        let transport = MockTransport::new();
        let client = Client::with_transport(config, transport.clone()).unwrap();

        transport.push_json(200, json!({"gfyname": "abc123"}));
        transport.push_text(200, "");
        transport.push_json(200, json!({"task": "encoding"}));
        transport.push_json(200, json!({"task": "encoding"}));
        transport.push_json(404, json!({"errorMessage": "not found"}));

        let result = client
            .upload_from_file(video(&dir), UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(transport.request_count(), 5);
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn skipped_checks_return_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_json(200, json!({"gfyname": "abc123"}));
        transport.push_text(200, "");

        let result = client
            .upload_from_file(video(&dir), UploadOptions::default().check_upload(false))
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn too_many_tags_fail_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        let tags: Vec<String> = (0..21).map(|i| format!("tag{i}")).collect();

        let err = client
            .upload_from_file(video(&dir), UploadOptions::default().tags(tags))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TooManyTags { supplied: 21, max: 20 }));
        assert_eq!(err.to_string(), "too many tags: supplied 21, max. 20");
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn missing_file_fails_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);

        let err = client
            .upload_from_file(dir.path().join("nope.mp4"), UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{err:?}");
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn other_fetch_failures_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let (client, transport) = client(&dir);
        transport.push_json(200, json!({"gfyname": "abc123"}));
        transport.push_text(200, "");
        transport.push_json(200, json!({"task": "complete"}));
        transport.push_text(200, "<html>not json</html>");

        let err = client
            .upload_from_file(video(&dir), UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)), "{err:?}");
    }
}
