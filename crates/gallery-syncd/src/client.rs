use async_trait::async_trait;
use gallery_core::fingerprint::content_digest_header;
use gallery_core::{Credentials, GalleryError, LocalAsset, RemoteAsset, StateHandle};
use gallery_proto::{
    FacesResponse, LoginRequest, MediaInfo, PartialSyncResponse, Person, Preview,
    PreviewUrlResponse, RefreshRequest, RemoteAssetInfo, TokenResponse, UploadResponse,
    CONTENT_DIGEST_HEADER, SINCE_HEADER, SINCE_REQUEST_HEADER, TIMESTAMP_HEADER,
};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Error)]
pub enum ClientError {
    /// No usable credentials, or the refresh-and-retry path failed
    #[error("session expired")]
    SessionExpired,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with {0}")]
    Status(StatusCode),

    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    State(#[from] anyhow::Error),
}

impl From<ClientError> for GalleryError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::SessionExpired => GalleryError::SessionExpired,
            ClientError::Io { path, source } => GalleryError::Io { path, source },
            ClientError::State(e) => GalleryError::State(e),
            other => GalleryError::Remote(other.to_string()),
        }
    }
}

/// Result of a full catalog fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullSync {
    pub assets: Vec<RemoteAsset>,
    /// Watermark to store for the next partial sync (0 when the server sent none)
    pub watermark: i64,
}

/// Result of a partial catalog fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaSync {
    pub uploaded: Vec<RemoteAsset>,
    pub deleted: Vec<String>,
    /// Watermark to store next (the requested one when the server sent none)
    pub watermark: i64,
}

/// Which listing a cluster id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKind {
    Cluster,
    Face,
}

impl ClusterKind {
    fn path_segment(self) -> &'static str {
        match self {
            ClusterKind::Cluster => "clusters",
            ClusterKind::Face => "faces",
        }
    }
}

/// Source of the remote catalog used by the reconciliation engine.
///
/// `Ok(None)` means the fetch failed for a reason other than an expired
/// session; the caller must treat it as "unknown", never as "empty".
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn sync_full(&self) -> Result<Option<FullSync>, ClientError>;
    async fn sync_delta(&self, since: i64) -> Result<Option<DeltaSync>, ClientError>;
}

/// Destination for local files that have no remote counterpart yet
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Returns the server-assigned id, or `None` if the server did not accept the file
    async fn upload_asset(&self, asset: &LocalAsset) -> Result<Option<String>, ClientError>;
}

/// Authenticated HTTP client for the gallery server.
///
/// Every authorized call follows the same protocol: on a 401 the access token
/// is refreshed once and the request replayed once; if the refresh fails the
/// call fails with [`ClientError::SessionExpired`] and the logout signal fires.
#[derive(Clone)]
pub struct RemoteSyncClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    state: StateHandle,
    refresh_lock: Mutex<RefreshOutcome>,
    /// Number of finished refresh attempts, readable without the lock
    refresh_generation: AtomicU64,
    session_expired: watch::Sender<bool>,
}

/// Result of the most recent refresh attempt
#[derive(Default)]
struct RefreshOutcome {
    generation: u64,
    rejected_token: String,
    refreshed: bool,
}

impl RemoteSyncClient {
    pub fn new(state: StateHandle, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let (session_expired, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                state,
                refresh_lock: Mutex::new(RefreshOutcome::default()),
                refresh_generation: AtomicU64::new(0),
                session_expired,
            }),
        })
    }

    /// Receiver that flips to `true` whenever a call ends in `SessionExpired`
    pub fn session_events(&self) -> watch::Receiver<bool> {
        self.inner.session_expired.subscribe()
    }

    /// Exchange username and password for a token triple and store it
    pub async fn login(
        &self,
        server_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Credentials, ClientError> {
        let server_url = server_url.trim_end_matches('/').to_string();
        let response = self
            .inner
            .http
            .post(endpoint(&server_url, "login"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(ClientError::InvalidCredentials),
            status if !status.is_success() => return Err(ClientError::Status(status)),
            _ => {}
        }

        let tokens: TokenResponse = response.json().await?;
        let credentials = Credentials {
            server_url,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
        };
        let state = self.inner.state.clone();
        let (stored, account) = (credentials.clone(), username.to_string());
        on_blocking_pool(move || {
            state.update(|state| {
                state.store_credentials(&stored);
                state.auth.username = Some(account);
            })
        })
        .await?;
        self.inner.session_expired.send_replace(false);

        tracing::info!(server = %credentials.server_url, %username, "logged in");
        Ok(credentials)
    }

    /// Drop the stored tokens; server and username are kept for the next login
    pub fn logout(&self) -> Result<(), ClientError> {
        self.inner.state.clear_session()?;
        Ok(())
    }

    /// Refresh the current access token. Returns false if there is nothing to
    /// refresh or the server refused.
    pub async fn refresh(&self) -> bool {
        let seen = self.inner.refresh_generation.load(Ordering::Acquire);
        match self.credentials().await {
            Ok(Some(credentials)) => self.refresh_from(&credentials.access_token, seen).await,
            _ => false,
        }
    }

    /// Single-flight refresh of a token that the server just rejected.
    ///
    /// `seen` is the refresh generation observed before the rejected request
    /// was sent. Callers queued behind an attempt for the same token take its
    /// result, success or failure, instead of asking the server again.
    async fn refresh_from(&self, rejected_token: &str, seen: u64) -> bool {
        let mut last = self.inner.refresh_lock.lock().await;
        if last.generation != seen && last.rejected_token == rejected_token {
            tracing::debug!(refreshed = last.refreshed, "sharing result of a concurrent refresh");
            return last.refreshed;
        }

        let credentials = match self.credentials().await {
            Ok(Some(credentials)) => credentials,
            _ => return false,
        };
        if credentials.access_token != rejected_token {
            tracing::debug!("access token already rotated by a concurrent refresh");
            return true;
        }

        let refreshed = self.request_refresh(credentials).await;
        last.generation += 1;
        last.rejected_token = rejected_token.to_string();
        last.refreshed = refreshed;
        self.inner
            .refresh_generation
            .store(last.generation, Ordering::Release);
        refreshed
    }

    /// POST the refresh token and store the rotated triple
    async fn request_refresh(&self, credentials: Credentials) -> bool {

        let response = self
            .inner
            .http
            .post(endpoint(&credentials.server_url, "refresh"))
            .json(&RefreshRequest {
                access_token: credentials.access_token.clone(),
                refresh_token: credentials.refresh_token.clone(),
            })
            .send()
            .await;

        let tokens = match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<TokenResponse>().await {
                    Ok(tokens) => tokens,
                    Err(e) => {
                        tracing::warn!("malformed refresh response: {e}");
                        return false;
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "token refresh rejected");
                return false;
            }
            Err(e) => {
                tracing::warn!("token refresh failed: {e}");
                return false;
            }
        };

        let rotated = Credentials {
            server_url: credentials.server_url,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
        };
        let state = self.inner.state.clone();
        match on_blocking_pool(move || state.store_credentials(&rotated)).await {
            Ok(()) => {
                tracing::debug!("access token refreshed");
                true
            }
            Err(e) => {
                tracing::warn!("failed to store refreshed tokens: {e:#}");
                false
            }
        }
    }

    fn expire(&self) -> ClientError {
        tracing::warn!("session expired");
        self.inner.session_expired.send_replace(true);
        ClientError::SessionExpired
    }

    /// Read the stored triple off the async runtime
    async fn credentials(&self) -> Result<Option<Credentials>, ClientError> {
        let state = self.inner.state.clone();
        on_blocking_pool(move || state.credentials()).await
    }

    async fn current_credentials(&self) -> Result<Credentials, ClientError> {
        match self.credentials().await? {
            Some(credentials) => Ok(credentials),
            None => Err(self.expire()),
        }
    }

    /// Send a bearer-authorized request, refreshing and replaying at most once.
    ///
    /// `build` is called once per attempt so request bodies can be recreated.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, ClientError>
    where
        F: Fn(&reqwest::Client, &Credentials) -> Result<RequestBuilder, ClientError> + Send,
    {
        let seen = self.inner.refresh_generation.load(Ordering::Acquire);
        let credentials = self.current_credentials().await?;
        let response = build(&self.inner.http, &credentials)?
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(url = %response.url(), "access token rejected, refreshing");
        if !self.refresh_from(&credentials.access_token, seen).await {
            return Err(self.expire());
        }

        let credentials = self.current_credentials().await?;
        let response = build(&self.inner.http, &credentials)?
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(self.expire());
        }
        Ok(response)
    }

    /// Collapse every failure except `SessionExpired` into `None`
    fn successful(
        &self,
        result: Result<Response, ClientError>,
        what: &str,
    ) -> Result<Option<Response>, ClientError> {
        match result {
            Ok(response) if response.status().is_success() => Ok(Some(response)),
            Ok(response) => {
                tracing::warn!(status = %response.status(), "{what} failed");
                Ok(None)
            }
            Err(ClientError::SessionExpired) => Err(ClientError::SessionExpired),
            Err(e) => {
                tracing::warn!("{what} failed: {e}");
                Ok(None)
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, u32)],
        what: &str,
    ) -> Result<Option<T>, ClientError> {
        let result = self
            .send_authorized(|http, credentials| {
                Ok(http.get(endpoint(&credentials.server_url, path)).query(query))
            })
            .await;
        let Some(response) = self.successful(result, what)? else {
            return Ok(None);
        };
        match response.json::<T>().await {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("{what} returned a malformed body: {e}");
                Ok(None)
            }
        }
    }

    /// Fetch the whole catalog
    pub async fn sync_full(&self) -> Result<Option<FullSync>, ClientError> {
        let result = self
            .send_authorized(|http, credentials| {
                Ok(http.get(endpoint(&credentials.server_url, "sync/full")))
            })
            .await;
        let Some(response) = self.successful(result, "full sync")? else {
            return Ok(None);
        };

        let watermark = response_watermark(&response).unwrap_or(0);
        match response.json::<Vec<RemoteAssetInfo>>().await {
            Ok(assets) => {
                tracing::info!(assets = assets.len(), watermark, "full sync received");
                Ok(Some(FullSync {
                    assets: assets.into_iter().map(into_remote_asset).collect(),
                    watermark,
                }))
            }
            Err(e) => {
                tracing::warn!("full sync returned a malformed body: {e}");
                Ok(None)
            }
        }
    }

    /// Fetch catalog changes since `since`
    pub async fn sync_delta(&self, since: i64) -> Result<Option<DeltaSync>, ClientError> {
        let result = self
            .send_authorized(|http, credentials| {
                Ok(http
                    .get(endpoint(&credentials.server_url, "sync/partial"))
                    .header(SINCE_REQUEST_HEADER, since.to_string()))
            })
            .await;
        let Some(response) = self.successful(result, "partial sync")? else {
            return Ok(None);
        };

        let watermark = response_watermark(&response).unwrap_or(since);
        match response.json::<PartialSyncResponse>().await {
            Ok(delta) => {
                tracing::info!(
                    uploaded = delta.uploaded.len(),
                    deleted = delta.deleted.len(),
                    since,
                    watermark,
                    "partial sync received"
                );
                Ok(Some(DeltaSync {
                    uploaded: delta.uploaded.into_iter().map(into_remote_asset).collect(),
                    deleted: delta.deleted,
                    watermark,
                }))
            }
            Err(e) => {
                tracing::warn!("partial sync returned a malformed body: {e}");
                Ok(None)
            }
        }
    }

    /// Short-lived thumbnail URL, empty on failure
    pub async fn resolve_preview_url(&self, id: &str) -> Result<String, ClientError> {
        let path = format!("preview/{}", urlencoding::encode(id));
        let result = self
            .send_authorized(|http, credentials| {
                Ok(http.get(endpoint(&credentials.server_url, &path)))
            })
            .await;
        let Some(response) = self.successful(result, "preview lookup")? else {
            return Ok(String::new());
        };
        match response.text().await {
            Ok(body) => Ok(parse_preview_body(&body)),
            Err(e) => {
                tracing::warn!("preview lookup body unreadable: {e}");
                Ok(String::new())
            }
        }
    }

    /// Full-media description, `None` on failure
    pub async fn media_info(&self, id: &str) -> Result<Option<MediaInfo>, ClientError> {
        let path = format!("media/{}", urlencoding::encode(id));
        self.get_json(&path, &[], "media lookup").await
    }

    /// Short-lived full-resolution URL, empty on failure
    pub async fn resolve_full_url(&self, id: &str) -> Result<String, ClientError> {
        Ok(self
            .media_info(id)
            .await?
            .map(|info| info.media_url)
            .unwrap_or_default())
    }

    /// Known people first, then unknown clusters
    pub async fn list_people(&self) -> Result<Vec<Person>, ClientError> {
        let faces: Option<FacesResponse> = self.get_json("faces", &[], "people listing").await?;
        Ok(faces
            .map(|faces| {
                let mut people = faces.known_people;
                people.extend(faces.unknown_people);
                people
            })
            .unwrap_or_default())
    }

    pub async fn search(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Preview>, ClientError> {
        let path = format!("search/{}", urlencoding::encode(query));
        let previews = self
            .get_json(&path, &[("page", page), ("page_size", page_size)], "search")
            .await?;
        Ok(previews.unwrap_or_default())
    }

    pub async fn cluster_previews(
        &self,
        cluster_id: &str,
        page: u32,
        page_size: u32,
        kind: ClusterKind,
    ) -> Result<Vec<Preview>, ClientError> {
        let path = format!(
            "{}/{}",
            kind.path_segment(),
            urlencoding::encode(cluster_id)
        );
        let previews = self
            .get_json(
                &path,
                &[("page", page), ("page_size", page_size)],
                "cluster listing",
            )
            .await?;
        Ok(previews.unwrap_or_default())
    }

    /// Stream a local file to the server.
    ///
    /// Local I/O errors are returned as [`ClientError::Io`]; server and
    /// transport failures yield `Ok(None)`.
    pub async fn upload_asset(&self, asset: &LocalAsset) -> Result<Option<String>, ClientError> {
        let file_name = asset
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| asset.id.clone());

        let result = self
            .send_authorized(|http, credentials| {
                let file = std::fs::File::open(&asset.path).map_err(|source| ClientError::Io {
                    path: asset.path.clone(),
                    source,
                })?;
                let length = file
                    .metadata()
                    .map_err(|source| ClientError::Io {
                        path: asset.path.clone(),
                        source,
                    })?
                    .len();
                let body = reqwest::Body::from(tokio::fs::File::from_std(file));
                let part = Part::stream_with_length(body, length)
                    .file_name(file_name.clone())
                    .mime_str(&asset.mime_type)?;

                let mut request = http
                    .post(endpoint(&credentials.server_url, "image/upload"))
                    .header(TIMESTAMP_HEADER, asset.timestamp.to_string())
                    .multipart(Form::new().part("file", part));
                if let Some(ref fingerprint) = asset.fingerprint {
                    request = request.header(CONTENT_DIGEST_HEADER, content_digest_header(fingerprint));
                }
                Ok(request)
            })
            .await;

        let result = match result {
            Err(e @ ClientError::Io { .. }) => return Err(e),
            other => other,
        };
        let Some(response) = self.successful(result, "upload")? else {
            return Ok(None);
        };
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("upload response unreadable: {e}");
                return Ok(None);
            }
        };

        let remote_id = parse_upload_body(&body);
        match remote_id {
            Some(ref id) => tracing::info!(local_id = %asset.id, remote_id = %id, "uploaded"),
            None => tracing::warn!(local_id = %asset.id, "upload response carried no id"),
        }
        Ok(remote_id)
    }
}

#[async_trait]
impl CatalogSource for RemoteSyncClient {
    async fn sync_full(&self) -> Result<Option<FullSync>, ClientError> {
        RemoteSyncClient::sync_full(self).await
    }

    async fn sync_delta(&self, since: i64) -> Result<Option<DeltaSync>, ClientError> {
        RemoteSyncClient::sync_delta(self, since).await
    }
}

#[async_trait]
impl AssetUploader for RemoteSyncClient {
    async fn upload_asset(&self, asset: &LocalAsset) -> Result<Option<String>, ClientError> {
        RemoteSyncClient::upload_asset(self, asset).await
    }
}

/// Run a state-file operation on the blocking pool
async fn on_blocking_pool<T, F>(f: F) -> Result<T, ClientError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("state worker failed: {e}"))?
        .map_err(ClientError::from)
}

fn endpoint(server_url: &str, path: &str) -> String {
    format!("{}/{}", server_url.trim_end_matches('/'), path)
}

fn response_watermark(response: &Response) -> Option<i64> {
    response
        .headers()
        .get(SINCE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn into_remote_asset(info: RemoteAssetInfo) -> RemoteAsset {
    RemoteAsset {
        id: info.id,
        fingerprint: info.hash,
        timestamp: info.created_at,
    }
}

fn parse_preview_body(body: &str) -> String {
    if let Ok(preview) = serde_json::from_str::<PreviewUrlResponse>(body) {
        return preview.preview_url;
    }
    if let Ok(url) = serde_json::from_str::<String>(body) {
        return url;
    }
    body.trim().to_string()
}

fn parse_upload_body(body: &str) -> Option<String> {
    let id = match serde_json::from_str::<UploadResponse>(body) {
        Ok(response) => response.into_id(),
        Err(_) => body.trim().to_string(),
    };
    (!id.is_empty()).then_some(id)
}
