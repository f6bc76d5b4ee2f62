//! OAuth 2.0 token lifecycle for the Gfycat API.
//!
//! [`TokenManager`] owns the credential bundle. It is the only thing that replaces it, and the
//! bearer token every request carries is read straight out of it, so credentials and the active
//! `Authorization` header can never disagree.
//!
//! Gfycat's token endpoint is not quite standard (JSON bodies, a `refresh` grant type), so the
//! exchanges are done by hand; the [`oauth2`] crate is used for the authorization URL and for
//! keeping secrets out of debug output.

use crate::config::Config;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{Error, Result};
use crate::transport::{Body, Content, HttpRequest, Transport};
use http::{Method, StatusCode};
use http_body_util::Full;
use hyper::body::{self, Bytes};
use hyper::service::service_fn;
use hyper::{Request, Response};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope};
use std::convert::Infallible;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, oneshot};
use url::Url;

/// Fixed `state` value sent with the authorization request and expected back on the redirect.
const STATE: &str = "gfycat-rs";

const OAUTH_DONE_HTML: &str = "<h2>You may close this window now!</h2>";

#[derive(Debug)]
pub(crate) struct TokenManager {
    client_id: ClientId,
    client_secret: ClientSecret,
    token_url: Url,
    auth_url: AuthUrl,
    redirect_url: RedirectUrl,
    callback_port: u16,
    open_browser: bool,
    authorization_timeout: Option<Duration>,
    store: CredentialStore,
    credentials: Mutex<Credentials>,
}

impl TokenManager {
    pub(crate) fn new(config: &Config, api_base: &Url) -> Result<Self> {
        let token_url = crate::route::Route::api(api_base, Method::POST, &["oauth", "token"])
            .url()
            .clone();
        let auth_url = AuthUrl::new(config.authorize_url.clone()).map_err(|source| {
            Error::InvalidUrl {
                url: config.authorize_url.clone(),
                source,
            }
        })?;
        let redirect_uri = config.redirect_uri();
        let redirect_url = RedirectUrl::new(redirect_uri.clone()).map_err(|source| {
            Error::InvalidUrl {
                url: redirect_uri,
                source,
            }
        })?;

        Ok(Self {
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
            token_url,
            auth_url,
            redirect_url,
            callback_port: config.callback_port,
            open_browser: config.open_browser,
            authorization_timeout: config.authorization_timeout,
            store: CredentialStore::new(&config.credentials_path),
            credentials: Mutex::new(Credentials::default()),
        })
    }

    /// The access token to send as bearer, if we hold one.
    pub(crate) async fn bearer(&self) -> Option<String> {
        self.credentials
            .lock()
            .await
            .access_token()
            .map(str::to_owned)
    }

    pub(crate) async fn credentials(&self) -> Credentials {
        self.credentials.lock().await.clone()
    }

    async fn install(&self, credentials: Credentials) {
        *self.credentials.lock().await = credentials;
    }

    /// Installs whatever the credentials file holds, creating the file if needed.
    pub(crate) async fn install_stored(&self) -> Result<()> {
        let stored = self.store.load_or_create().await?;
        self.install(stored).await;
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let credentials = self.credentials().await;
        self.store.save(&credentials).await
    }

    /// Loads stored credentials and makes sure they are usable.
    ///
    /// The stored refresh token is exchanged for fresh credentials. If Gfycat rejects it as
    /// invalid (or none is stored), the user is sent through the interactive browser flow
    /// instead. Either way the resulting bundle is written back to disk. Any other failure is
    /// returned unchanged.
    #[tracing::instrument(skip_all, fields(path = %self.store.path().display()))]
    pub(crate) async fn authenticate<T: Transport>(&self, transport: &T) -> Result<()> {
        self.install_stored().await?;
        let has_refresh_token = self.credentials.lock().await.refresh_token().is_some();

        if has_refresh_token {
            match self.refresh(transport).await {
                Ok(()) => return self.persist().await,
                Err(e) if e.is_invalid_refresh_token() => {
                    tracing::warn!(error = %e, "stored refresh token was rejected, re-authorizing");
                }
                Err(e) => return Err(e),
            }
        } else {
            tracing::info!("no refresh token stored, starting interactive authorization");
        }

        self.authorize(transport).await?;
        self.persist().await
    }

    /// Exchanges the current refresh token for a new credential bundle.
    pub(crate) async fn refresh<T: Transport>(&self, transport: &T) -> Result<()> {
        let previous = self.credentials().await;
        let Some(refresh_token) = previous.refresh_token() else {
            return Err(Error::MissingRefreshToken);
        };

        tracing::debug!("refreshing OAuth token");
        let payload = serde_json::json!({
            "refresh_token": refresh_token,
            "client_id": self.client_id.as_str(),
            "client_secret": self.client_secret.secret(),
            "grant_type": "refresh",
        });
        let mut fresh = self.exchange(transport, payload).await?;
        fresh.inherit_refresh_token(&previous);
        self.install(fresh).await;
        tracing::debug!("successfully refreshed OAuth token");
        Ok(())
    }

    /// Runs the browser flow and trades the resulting code for credentials.
    async fn authorize<T: Transport>(&self, transport: &T) -> Result<()> {
        let code = self.authorization_code().await?;
        self.exchange_code(transport, code).await
    }

    async fn exchange_code<T: Transport>(&self, transport: &T, code: AuthorizationCode) -> Result<()> {
        let payload = serde_json::json!({
            "code": code.secret(),
            "client_id": self.client_id.as_str(),
            "client_secret": self.client_secret.secret(),
            "grant_type": "authorization_code",
            "redirect_uri": self.redirect_url.as_str(),
        });
        let credentials = self.exchange(transport, payload).await?;
        self.install(credentials).await;
        tracing::info!("authorization succeeded");
        Ok(())
    }

    /// POSTs a grant to the token endpoint.
    ///
    /// The request carries no bearer token and is never retried; a rejected grant cannot be
    /// fixed by refreshing.
    ///
    /// # Arguments
    ///
    /// * `transport` - where to send the request.
    /// * `grant` - the JSON body, including client credentials and `grant_type`.
    ///
    /// # Returns
    ///
    /// The credential bundle from the response. Any non-2xx status becomes an [`Error::Auth`]
    /// carrying the remote code and message, whether or not the body was valid JSON.
    async fn exchange<T: Transport>(
        &self,
        transport: &T,
        grant: serde_json::Value,
    ) -> Result<Credentials> {
        let mut request = HttpRequest::new(Method::POST, self.token_url.clone());
        request.body = Body::Json(grant);
        let response = transport.send(request).await?;
        if !response.status.is_success() {
            return Err(Error::auth(response.status, &Content::decode_lossy(&response)));
        }
        Content::decode(&response)?.deserialize()
    }

    pub(crate) fn authorization_url(&self) -> Url {
        let client = BasicClient::new(self.client_id.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());
        let (url, _state) = client
            .authorize_url(|| CsrfToken::new(STATE.to_string()))
            .add_scope(Scope::new("all".to_string()))
            .url();
        url
    }

    /// Sends the user to Gfycat's consent page and waits for the redirect to come back.
    async fn authorization_code(&self) -> Result<AuthorizationCode> {
        let (addr, eventually_code) =
            listen_for_code(SocketAddr::from((Ipv4Addr::LOCALHOST, self.callback_port))).await?;
        tracing::debug!(%addr, "authorization callback listener ready");

        let auth_url = self.authorization_url();
        if self.open_browser {
            tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
            if let Err(e) = webbrowser::open(auth_url.as_str()) {
                tracing::warn!(error = %e, url = %auth_url, "could not open a browser, open the URL manually");
            }
        } else {
            tracing::info!(url = %auth_url, "open this URL in a browser to authorize the application");
        }

        match self.authorization_timeout {
            Some(limit) => tokio::time::timeout(limit, eventually_code)
                .await
                .map_err(|_| Error::AuthorizationTimeout(limit))?,
            None => eventually_code.await,
        }
    }
}

/// Binds the callback listener and returns its address plus a future for the captured code.
///
/// The listener runs on its own task and stops as soon as it has handed over a code, or as soon
/// as the returned future is dropped (for example by a timeout), releasing the port either way.
pub(crate) async fn listen_for_code(
    addr: SocketAddr,
) -> Result<(SocketAddr, impl Future<Output = Result<AuthorizationCode>>)> {
    let socket = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::io(format!("bind authorization callback listener to {addr}"), e))?;
    let addr = socket
        .local_addr()
        .map_err(|e| Error::io("get callback listener address", e))?;

    let (tx, rx) = oneshot::channel();
    tokio::spawn(serve_callback(socket, tx));

    Ok((addr, async move {
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Callback("callback listener exited prematurely".into())),
        }
    }))
}

/// Accepts connections on `socket` until a redirect carrying an outcome arrives.
///
/// Each connection is served on its own task by [`handle_redirect`], which reports back through
/// a bounded channel; the first outcome is forwarded on `tx` and the listener shuts down.
///
/// # Arguments
///
/// * `socket` - the bound callback listener, closed when this function returns.
/// * `tx` - receives the code, or the reason none will come. When the receiving side is dropped
///   the listener gives up without sending.
async fn serve_callback(socket: TcpListener, mut tx: oneshot::Sender<Result<AuthorizationCode>>) {
    let (got, mut gotten) = mpsc::channel(1);
    loop {
        tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("authorization abandoned, closing callback listener");
                return;
            }
            outcome = gotten.recv() => {
                if let Some(outcome) = outcome {
                    let _ = tx.send(outcome);
                }
                return;
            }
            accepted = socket.accept() => {
                let conn = match accepted {
                    Ok((conn, _)) => conn,
                    Err(e) => {
                        let _ = tx.send(Err(Error::io("accept authorization callback", e)));
                        return;
                    }
                };
                let got = got.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<body::Incoming>| {
                        let got = got.clone();
                        async move { Ok::<_, Infallible>(handle_redirect(&req, &got)) }
                    });
                    let conn = hyper_util::rt::TokioIo::new(conn);
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .keep_alive(false)
                        .serve_connection(conn, service)
                        .await
                    {
                        tracing::debug!(error = %e, "authorization callback connection failed");
                    }
                });
            }
        }
    }
}

/// Answers one request to the callback listener, forwarding the outcome if it carries one.
fn handle_redirect(
    req: &Request<body::Incoming>,
    got: &mpsc::Sender<Result<AuthorizationCode>>,
) -> Response<Full<Bytes>> {
    let mut state = None;
    let mut code = None;
    let mut error = None;
    for (k, v) in form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes()) {
        match &*k {
            "state" => state = Some(v),
            "code" => code = Some(v),
            "error" => error = Some(v),
            _ => {}
        }
    }

    if let Some(error) = error {
        let _ = got.try_send(Err(Error::Callback(format!("authorization denied: {error}"))));
        return respond(StatusCode::OK, OAUTH_DONE_HTML);
    }
    // Browsers like to ask for a favicon too; anything without a code is not our redirect.
    let Some(code) = code else {
        return respond(StatusCode::BAD_REQUEST, "missing authorization code");
    };
    if state.as_deref() != Some(STATE) {
        return respond(StatusCode::BAD_REQUEST, "invalid state");
    }

    let _ = got.try_send(Ok(AuthorizationCode::new(code.into_owned())));
    respond(StatusCode::OK, OAUTH_DONE_HTML)
}

fn respond(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}
