use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response header carrying the next sync watermark
pub const SINCE_HEADER: &str = "since";
/// Request header carrying the watermark a partial sync starts from
pub const SINCE_REQUEST_HEADER: &str = "Since";
pub const CONTENT_DIGEST_HEADER: &str = "Content-Digest";
pub const TIMESTAMP_HEADER: &str = "Timestamp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token triple returned by both login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Catalog entry as sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAssetInfo {
    pub id: String,
    pub hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialSyncResponse {
    #[serde(default)]
    pub uploaded: Vec<RemoteAssetInfo>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

/// Upload responses are either a bare id or an object carrying it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Id(String),
    Object { id: String },
}

impl UploadResponse {
    pub fn into_id(self) -> String {
        match self {
            UploadResponse::Id(id) | UploadResponse::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewUrlResponse {
    pub preview_url: String,
}

/// Full-media description with EXIF-like metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub media_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub camera_make: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub exposure_time: Option<String>,
    #[serde(default)]
    pub f_number: Option<f64>,
    #[serde(default)]
    pub iso: Option<u32>,
    #[serde(default)]
    pub focal_length: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub date_taken: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacesResponse {
    #[serde(default)]
    pub known_people: Vec<Person>,
    #[serde(default)]
    pub unknown_people: Vec<Person>,
}

/// Thumbnail entry returned by search and cluster listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub id: String,
    pub preview_url: String,
}
