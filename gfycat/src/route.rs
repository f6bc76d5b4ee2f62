//! Addresses of remote operations.

use http::Method;
use std::fmt;
use url::Url;

/// A single remote operation: an HTTP method plus a fully resolved URL.
///
/// API routes are built from path segments appended to the configured API base; each segment is
/// percent-encoded, so user-supplied ids can never escape their slot in the path. Custom routes
/// take an absolute URL as-is and are used for hosts outside the API, such as the upload
/// ingest server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Route {
    method: Method,
    url: Url,
}

impl Route {
    /// A route relative to the API base, e.g. `Route::api(&base, Method::GET, &["users", id])`.
    pub(crate) fn api(base: &Url, method: Method, segments: &[&str]) -> Self {
        let mut url = base.clone();
        // Bases are validated to be hierarchical http(s) URLs when the client is built.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        Self { method, url }
    }

    pub(crate) fn custom(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    pub(crate) fn method(&self) -> &Method {
        &self.method
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://api.gfycat.com/v1").unwrap()
    }

    #[test]
    fn api_routes_append_to_base_path() {
        let route = Route::api(&base(), Method::GET, &["me", "gfycats"]);
        assert_eq!(route.url().as_str(), "https://api.gfycat.com/v1/me/gfycats");
        assert_eq!(route.method(), Method::GET);

        let trailing = Url::parse("https://api.gfycat.com/v1/").unwrap();
        let route = Route::api(&trailing, Method::GET, &["me"]);
        assert_eq!(route.url().as_str(), "https://api.gfycat.com/v1/me");
    }

    #[test]
    fn path_parameters_are_percent_encoded() {
        let route = Route::api(&base(), Method::GET, &["users", "odd name/../x?", "gfycats"]);
        assert_eq!(
            route.url().as_str(),
            "https://api.gfycat.com/v1/users/odd%20name%2F..%2Fx%3F/gfycats"
        );
    }

    #[test]
    fn custom_routes_keep_their_url() {
        let url = Url::parse("https://filedrop.gfycat.com/").unwrap();
        let route = Route::custom(Method::POST, url.clone());
        assert_eq!(route.url(), &url);
        assert_eq!(route.to_string(), "POST https://filedrop.gfycat.com/");
    }
}
