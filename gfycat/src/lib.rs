//! A client for the [Gfycat API](https://developers.gfycat.com/api/).
//!
//! The [`Client`] takes care of the OAuth token lifecycle (interactive browser login, a
//! credentials file that survives restarts, refreshing and retrying when the API rejects a
//! token), cursor-paginated feeds, and uploads that wait for Gfycat to finish processing.
//!
//! ```rust,no_run
//! use gfycat::{Client, Config, FeedQuery, SortBy, UploadOptions};
//!
//! # async fn demo() -> eyre::Result<()> {
//! let config = Config::builder()
//!     .client_id("2_abcdef")
//!     .client_secret("s3cr3t")
//!     .credentials_path("gfycat-credentials.json")
//!     .build()?;
//! let client = Client::new(config)?;
//! client.authenticate().await?;
//!
//! let popular = client
//!     .get_own_feed(FeedQuery::new().limit(200).sort_by(SortBy::Views))
//!     .await?;
//! for gfy in popular.iter().take(5) {
//!     println!("{} ({} views)", gfy.url(), gfy.views);
//! }
//!
//! let uploaded = client
//!     .upload_from_file("clip.mp4", UploadOptions::default().title("my clip"))
//!     .await?;
//! # let _ = uploaded;
//! # Ok(())
//! # }
//! ```
//!
//! A blocking flavor with the same methods lives in [`blocking`].

pub mod blocking;
mod client;
pub mod config;
mod credentials;
mod error;
mod feed;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod models;
mod oauth;
mod paged;
mod route;
mod session;
pub mod transport;
mod upload;

pub use client::Client;
pub use config::{Config, ConfigBuilder};
pub use credentials::{CredentialStore, Credentials};
pub use error::{Error, INVALID_REFRESH_TOKEN, Result};
pub use feed::{FeedQuery, Limit, MIN_STREAM_PAGE_SIZE};
pub use models::{Follower, FollowerProfile, Gfy, PENDING_REVIEW_GATEKEEPER, SortBy, UploadStatus, User};
pub use transport::{ReqwestTransport, Transport};
pub use upload::{MAX_TAGS, UploadOptions};
