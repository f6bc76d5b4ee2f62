//! Gfycat resource types.
//!
//! These mirror the JSON objects the API returns, with field names converted to snake case.
//! Gfycat is loose about numbers (`likes` and friends may arrive as `"12"` or `12`) and about
//! `null`, so numeric fields go through lenient deserializers and most fields default when
//! absent.

use crate::config::GFYCAT_URL;
use crate::error::Error;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Gatekeeper level of gfycats held back for manual review.
pub const PENDING_REVIEW_GATEKEEPER: u64 = 5;

/// A single uploaded gfycat.
///
/// See: <https://developers.gfycat.com/api/#getting-gfycats>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Gfy {
    pub gfy_id: String,
    /// The key the gfycat was created under; also the last path segment of its URL.
    pub gfy_name: String,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub gfy_number: u64,
    pub gfy_slug: Option<String>,
    #[serde(deserialize_with = "de::null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "de::null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "de::null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "de::null_as_default")]
    pub language_categories: Vec<String>,
    #[serde(deserialize_with = "de::null_as_default")]
    pub domain_whitelist: Vec<String>,
    #[serde(deserialize_with = "de::null_as_default")]
    pub geo_whitelist: Vec<String>,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub published: u64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub nsfw: u64,
    /// Moderation level; see [`Gfy::is_pending_review`].
    #[serde(deserialize_with = "de::lenient_u64")]
    pub gatekeeper: u64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub views: u64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub likes: u64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub dislikes: u64,
    /// Unix timestamp (seconds) of the upload.
    #[serde(deserialize_with = "de::lenient_u64")]
    pub create_date: u64,
    pub has_audio: bool,
    pub has_transparency: bool,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub num_frames: f64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub mp4_size: u64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub webm_size: u64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub source: u64,
    pub md5: Option<String>,
    pub rating: Option<String>,
    pub avg_color: Option<String>,
    pub mp4_url: Option<String>,
    pub gif_url: Option<String>,
    pub webm_url: Option<String>,
    pub webp_url: Option<String>,
    pub mobile_url: Option<String>,
    pub mobile_poster_url: Option<String>,
    pub thumb100_poster_url: Option<String>,
    pub mini_url: Option<String>,
    pub gif100px: Option<String>,
    pub mini_poster_url: Option<String>,
    pub max5mb_gif: Option<String>,
    pub max2mb_gif: Option<String>,
    pub max1mb_gif: Option<String>,
    pub poster_url: Option<String>,
}

impl Gfy {
    /// Public page of this gfycat.
    pub fn url(&self) -> String {
        format!("{GFYCAT_URL}/{}", self.gfy_name)
    }

    pub fn created_at(&self) -> Option<Timestamp> {
        i64::try_from(self.create_date)
            .ok()
            .and_then(|secs| Timestamp::from_second(secs).ok())
    }

    /// True while Gfycat's moderation holds the gfycat back from the public.
    pub fn is_pending_review(&self) -> bool {
        self.gatekeeper == PENDING_REVIEW_GATEKEEPER
    }
}

/// A Gfycat account.
///
/// See: <https://developers.gfycat.com/api/#users>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct User {
    pub userid: String,
    pub username: String,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub views: u64,
    pub verified: bool,
    pub iframe_profile_image_visible: bool,
    pub url: Option<String>,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub following: u64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub followers: u64,
    #[serde(deserialize_with = "de::lenient_u64")]
    pub create_date: u64,
    pub description: Option<String>,
    pub name: Option<String>,
    pub profile_image_url: Option<String>,
    #[serde(deserialize_with = "de::lenient_opt_u64")]
    pub published_gfycats: Option<u64>,
    #[serde(deserialize_with = "de::lenient_opt_u64")]
    pub published_albums: Option<u64>,
    #[serde(deserialize_with = "de::lenient_opt_u64")]
    pub total_gfycats: Option<u64>,
    #[serde(deserialize_with = "de::lenient_opt_u64")]
    pub total_bookmarks: Option<u64>,
    #[serde(deserialize_with = "de::lenient_opt_u64")]
    pub total_albums: Option<u64>,
    /// Only present for the authenticated user.
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub canonical_username: Option<String>,
    #[serde(deserialize_with = "de::lenient_opt_u64")]
    pub subscription: Option<u64>,
    #[serde(deserialize_with = "de::lenient_opt_u64")]
    pub viewing_preference: Option<u64>,
    pub domain_whitelist: Option<Vec<String>>,
    pub geo_whitelist: Option<Vec<String>>,
}

impl User {
    pub fn created_at(&self) -> Option<Timestamp> {
        i64::try_from(self.create_date)
            .ok()
            .and_then(|secs| Timestamp::from_second(secs).ok())
    }
}

/// One entry of `GET /me/followers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follower {
    pub follower_id: String,
    #[serde(default, deserialize_with = "de::lenient_opt_string")]
    pub follow_date: Option<String>,
}

/// A follower together with their full profile.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowerProfile {
    pub user: User,
    pub follow_date: Option<String>,
}

/// Processing state of an upload, as reported by `GET /gfycats/fetch/status/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub task: String,
    #[serde(default)]
    pub gfyname: Option<String>,
}

impl UploadStatus {
    pub fn is_complete(&self) -> bool {
        self.task == "complete"
    }
}

/// One page of a user feed.
#[derive(Debug, Deserialize)]
pub(crate) struct FeedPage {
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub gfycats: Vec<Gfy>,
    /// Opaque continuation token; empty once there is nothing left.
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub cursor: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GfyItemResponse {
    pub gfy_item: Gfy,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowersResponse {
    #[serde(default)]
    pub followers: Vec<Follower>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadKeyResponse {
    pub gfyname: String,
}

/// Field to order feed results by.
///
/// Parses from the API's field names (`createDate`) as well as their snake-case forms
/// (`create_date`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Views,
    Likes,
    Dislikes,
    CreateDate,
    GfyNumber,
    Mp4Size,
    Title,
    GfyName,
}

impl SortBy {
    /// Ascending comparison of two gfycats by this field.
    pub fn compare(self, a: &Gfy, b: &Gfy) -> Ordering {
        match self {
            SortBy::Views => a.views.cmp(&b.views),
            SortBy::Likes => a.likes.cmp(&b.likes),
            SortBy::Dislikes => a.dislikes.cmp(&b.dislikes),
            SortBy::CreateDate => a.create_date.cmp(&b.create_date),
            SortBy::GfyNumber => a.gfy_number.cmp(&b.gfy_number),
            SortBy::Mp4Size => a.mp4_size.cmp(&b.mp4_size),
            SortBy::Title => a.title.cmp(&b.title),
            SortBy::GfyName => a.gfy_name.cmp(&b.gfy_name),
        }
    }
}

impl FromStr for SortBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "views" => SortBy::Views,
            "likes" => SortBy::Likes,
            "dislikes" => SortBy::Dislikes,
            "createDate" | "create_date" => SortBy::CreateDate,
            "gfyNumber" | "gfy_number" => SortBy::GfyNumber,
            "mp4Size" | "mp4_size" => SortBy::Mp4Size,
            "title" => SortBy::Title,
            "gfyName" | "gfy_name" => SortBy::GfyName,
            other => return Err(Error::UnknownSortField(other.to_string())),
        })
    }
}

mod de {
    use serde::de::{Deserializer, Error as _};
    use serde::Deserialize;
    use serde_json::Value;

    pub(super) fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }

    fn number_from<E: serde::de::Error>(value: Value) -> Result<Option<u64>, E> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(Some)
                .ok_or_else(|| E::custom(format!("expected a non-negative number, got {n}"))),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| E::custom(format!("expected a numeric string, got {s:?}"))),
            other => Err(E::custom(format!("expected a number, got {other}"))),
        }
    }

    pub(super) fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(number_from::<D::Error>(Value::deserialize(d)?)?.unwrap_or_default())
    }

    pub(super) fn lenient_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        number_from(Value::deserialize(d)?)
    }

    pub(super) fn lenient_opt_string<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(D::Error::custom(format!("expected a string, got {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gfy_tolerates_stringly_numbers_and_nulls() {
        let gfy: Gfy = serde_json::from_value(json!({
            "gfyId": "abc123",
            "gfyName": "Abc123",
            "gfyNumber": "42",
            "title": null,
            "tags": null,
            "likes": "7",
            "dislikes": 1,
            "views": 1000,
            "nsfw": "0",
            "gatekeeper": 5,
            "createDate": 1582044960,
            "frameRate": 29.97,
            "thumb100PosterUrl": "https://thumbs.gfycat.com/x.jpg",
            "max5mbGif": "https://thumbs.gfycat.com/x.gif",
            "unknownField": {"ignored": true}
        }))
        .unwrap();

        assert_eq!(gfy.gfy_number, 42);
        assert_eq!(gfy.likes, 7);
        assert_eq!(gfy.dislikes, 1);
        assert_eq!(gfy.title, "");
        assert!(gfy.tags.is_empty());
        assert!(gfy.is_pending_review());
        assert_eq!(gfy.url(), "https://gfycat.com/Abc123");
        assert_eq!(
            gfy.thumb100_poster_url.as_deref(),
            Some("https://thumbs.gfycat.com/x.jpg")
        );
        assert!(gfy.max5mb_gif.is_some());
        assert_eq!(
            gfy.created_at().map(|t| t.as_second()),
            Some(1_582_044_960)
        );
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let err = serde_json::from_value::<Gfy>(json!({"likes": "many"})).unwrap_err();
        assert!(err.to_string().contains("numeric string"), "{err}");
    }

    #[test]
    fn user_and_followers_parse() {
        let user: User = serde_json::from_value(json!({
            "userid": "someone",
            "username": "someone",
            "views": "12",
            "verified": false,
            "followers": 3,
            "publishedGfycats": "9",
            "createDate": "1500000000"
        }))
        .unwrap();
        assert_eq!(user.views, 12);
        assert_eq!(user.published_gfycats, Some(9));
        assert_eq!(user.email, None);
        assert!(user.created_at().is_some());

        let followers: FollowersResponse = serde_json::from_value(json!({
            "followers": [
                {"follower_id": "a", "follow_date": 1500000000},
                {"follower_id": "b", "follow_date": "2020-01-01"}
            ]
        }))
        .unwrap();
        assert_eq!(followers.followers[0].follow_date.as_deref(), Some("1500000000"));
        assert_eq!(followers.followers[1].follower_id, "b");
    }

    #[test]
    fn sort_fields_parse_both_spellings() {
        assert_eq!("views".parse::<SortBy>().unwrap(), SortBy::Views);
        assert_eq!("createDate".parse::<SortBy>().unwrap(), SortBy::CreateDate);
        assert_eq!("create_date".parse::<SortBy>().unwrap(), SortBy::CreateDate);
        assert!(matches!(
            "colour".parse::<SortBy>(),
            Err(Error::UnknownSortField(f)) if f == "colour"
        ));
    }

    #[test]
    fn upload_status_completion() {
        let status: UploadStatus = serde_json::from_value(json!({"task": "encoding"})).unwrap();
        assert!(!status.is_complete());
        let status: UploadStatus =
            serde_json::from_value(json!({"task": "complete", "gfyname": "abc123"})).unwrap();
        assert!(status.is_complete());
    }
}
