//! Authorized request execution.

use crate::error::{Error, Result};
use crate::oauth::TokenManager;
use crate::route::Route;
use crate::transport::{Body, Content, HttpRequest, Transport};
use http::StatusCode;

/// A request before authorization is attached.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    route: Route,
    query: Vec<(String, String)>,
    body: Body,
    no_auth: bool,
}

impl Call {
    pub(crate) fn new(route: Route) -> Self {
        Self {
            route,
            query: Vec::new(),
            body: Body::Empty,
            no_auth: false,
        }
    }

    pub(crate) fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_owned(), value.to_string()));
        self
    }

    pub(crate) fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Send the first attempt without a bearer token.
    pub(crate) fn no_auth(mut self) -> Self {
        self.no_auth = true;
        self
    }

    fn to_request(&self, bearer: Option<String>) -> HttpRequest {
        let mut request = HttpRequest::new(self.route.method().clone(), self.route.url().clone());
        request.query = self.query.clone();
        request.body = self.body.clone();
        request.bearer = bearer;
        request
    }
}

/// A transport paired with the tokens it authorizes with.
#[derive(Debug)]
pub(crate) struct Session<T> {
    pub(crate) transport: T,
    pub(crate) tokens: TokenManager,
}

impl<T: Transport> Session<T> {
    /// Executes `call`, refreshing the token and retrying once if the API rejects our
    /// credentials.
    ///
    /// A retry always carries the freshly refreshed bearer token, even for calls that went out
    /// unauthenticated the first time.
    #[tracing::instrument(skip_all, fields(route = %call.route))]
    pub(crate) async fn request(&self, call: &Call) -> Result<Content> {
        let mut authorize = !call.no_auth;
        let mut retried = false;
        loop {
            let bearer = if authorize {
                self.tokens.bearer().await
            } else {
                None
            };
            let response = self.transport.send(call.to_request(bearer)).await?;
            let status = response.status;
            if status.is_success() {
                return Content::decode(&response);
            }

            let content = Content::decode_lossy(&response);
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                if retried {
                    return Err(Error::auth(status, &content));
                }
                tracing::debug!(%status, "credentials rejected, refreshing and retrying once");
                self.tokens.refresh(&self.transport).await?;
                retried = true;
                authorize = true;
                continue;
            }
            return Err(Error::Api {
                status,
                payload: content,
            });
        }
    }

    /// Like [`Session::request`], deserializing a successful response into `R`.
    pub(crate) async fn request_json<R: serde::de::DeserializeOwned>(&self, call: &Call) -> Result<R> {
        self.request(call).await?.deserialize()
    }
}
