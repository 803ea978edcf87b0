use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Configuration for the gallery sync engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Server suggested by `gallery login` when none is given
    pub server_url: Option<String>,

    /// Interval between scheduled syncs in seconds
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,

    /// Upper bound for every HTTP request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Number of files fingerprinted concurrently (1 = sequential)
    #[serde(default = "default_checksum_workers")]
    pub checksum_workers: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory treated as the device media index
    pub media_dir: Option<PathBuf>,
}

/// Machine-specific state that should not be synced across devices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub auth: AuthState,

    #[serde(default)]
    pub sync: SyncState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthState {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Watermark returned by the last successful sync, 0 before the first full sync
    #[serde(default)]
    pub last_sync: i64,

    /// Path to the local sync database
    pub database_path: Option<PathBuf>,
}

/// Bearer credentials for one server, always replaced as a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server_url: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_sync_interval() -> u64 {
    300 // 5 minutes
}

fn default_request_timeout() -> u64 {
    30
}

fn default_checksum_workers() -> usize {
    1
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            interval_seconds: default_sync_interval(),
            request_timeout_secs: default_request_timeout(),
            checksum_workers: default_checksum_workers(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let path = Self::get_config_path()?;
        if !path.exists() {
            let default_config = Self::default();
            default_config.save_to(&path)?;
            return Ok(default_config);
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    /// Config file path, `GALLERY_CONFIG` overrides `~/.config/gallery/config.toml`
    pub fn get_config_path() -> Result<PathBuf> {
        if let Ok(custom_path) = std::env::var("GALLERY_CONFIG") {
            return Ok(PathBuf::from(custom_path));
        }
        let home_dir = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home_dir.join(".config").join("gallery").join("config.toml"))
    }

    /// Media directory, defaulting to the platform pictures folder
    pub fn get_media_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.paths.media_dir {
            return Ok(expand_tilde(dir));
        }
        dirs::picture_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Pictures")))
            .context("Cannot determine pictures directory")
    }
}

impl State {
    /// Load state from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let path = Self::get_state_path()?;
        Self::load_or_create(&path)
    }

    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut default_state = Self::default();
            default_state.init()?;
            default_state.save_to(path)?;
            return Ok(default_state);
        }
        Self::load_from(path)
    }

    /// Load state from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        Ok(state)
    }

    /// Write the state file atomically (temp file + rename)
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let state_dir = path
            .parent()
            .ok_or_else(|| anyhow!("State path has no parent: {}", path.display()))?;
        fs::create_dir_all(state_dir).context("Failed to create state directory")?;
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize state")?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, toml_str).context("Failed to write state file")?;
        fs::rename(&tmp, path).context("Failed to replace state file")?;
        Ok(())
    }

    /// State file path, `GALLERY_STATE` overrides `~/.local/share/gallery/state.toml`
    pub fn get_state_path() -> Result<PathBuf> {
        if let Ok(custom_path) = std::env::var("GALLERY_STATE") {
            return Ok(PathBuf::from(custom_path));
        }
        let home_dir = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home_dir
            .join(".local")
            .join("share")
            .join("gallery")
            .join("state.toml"))
    }

    /// Initialize state with defaults
    pub fn init(&mut self) -> Result<()> {
        if self.sync.database_path.is_none() {
            let home_dir = dirs::home_dir().context("Could not determine home directory")?;
            let state_dir = home_dir.join(".local").join("share").join("gallery");
            self.sync.database_path = Some(state_dir.join("gallery.db"));
        }
        Ok(())
    }

    /// Current credentials, if a server and both tokens are stored
    pub fn credentials(&self) -> Option<Credentials> {
        Some(Credentials {
            server_url: self.auth.server_url.clone()?,
            access_token: self.auth.access_token.clone()?,
            refresh_token: self.auth.refresh_token.clone()?,
            expires_at: self.auth.expires_at,
        })
    }

    pub fn store_credentials(&mut self, credentials: &Credentials) {
        self.auth.server_url = Some(credentials.server_url.clone());
        self.auth.access_token = Some(credentials.access_token.clone());
        self.auth.refresh_token = Some(credentials.refresh_token.clone());
        self.auth.expires_at = credentials.expires_at;
    }

    /// Forget tokens and the sync watermark; server and username stay for the next login
    pub fn clear_session(&mut self) {
        self.auth.access_token = None;
        self.auth.refresh_token = None;
        self.auth.expires_at = None;
        self.sync.last_sync = 0;
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials().is_some()
    }
}

/// Shared, persisted view of [`State`].
///
/// The remote client and the reconciliation engine hold clones of the same
/// handle so token rotation and watermark updates are seen by both. The
/// daemon and the CLI may each hold a handle on the same file, so every read
/// and every update starts from what is on disk; an update is written back
/// before the lock is released. In-memory handles never touch the filesystem.
#[derive(Clone)]
pub struct StateHandle {
    inner: Arc<Mutex<State>>,
    path: Option<PathBuf>,
}

impl StateHandle {
    /// Open the state file at its default location
    pub fn load() -> Result<Self> {
        let path = State::get_state_path()?;
        Self::open(path)
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let state = State::load_or_create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
            path: Some(path),
        })
    }

    /// A handle that never touches the filesystem
    pub fn in_memory(state: State) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            path: None,
        }
    }

    /// Lock the state, first picking up changes another process wrote
    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("state lock poisoned"))?;
        if let Some(ref path) = self.path {
            if path.exists() {
                *state = State::load_from(path)?;
            }
        }
        Ok(state)
    }

    pub fn snapshot(&self) -> Result<State> {
        Ok(self.lock()?.clone())
    }

    /// Apply a change to the current on-disk state and persist it while still
    /// holding the lock
    pub fn update<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T> {
        let mut state = self.lock()?;
        let mut next = state.clone();
        let out = f(&mut next);
        if let Some(ref path) = self.path {
            next.save_to(path)?;
        }
        *state = next;
        Ok(out)
    }

    pub fn credentials(&self) -> Result<Option<Credentials>> {
        Ok(self.lock()?.credentials())
    }

    pub fn store_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.update(|state| state.store_credentials(credentials))
    }

    pub fn clear_session(&self) -> Result<()> {
        self.update(State::clear_session)
    }

    pub fn last_sync(&self) -> Result<i64> {
        Ok(self.lock()?.sync.last_sync)
    }

    pub fn set_last_sync(&self, watermark: i64) -> Result<()> {
        self.update(|state| state.sync.last_sync = watermark)
    }

    pub fn database_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.lock()?.sync.database_path.clone())
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            server_url: "http://gallery.local".into(),
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: None,
        }
    }

    #[test]
    fn test_config_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sync.interval_seconds, 300);
        assert_eq!(config.sync.request_timeout_secs, 30);
        assert_eq!(config.sync.checksum_workers, 1);
        assert!(config.paths.media_dir.is_none());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.sync.server_url = Some("https://photos.example".into());
        config.paths.media_dir = Some(PathBuf::from("/data/DCIM"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.sync.server_url.as_deref(), Some("https://photos.example"));
        assert_eq!(loaded.get_media_dir().unwrap(), PathBuf::from("/data/DCIM"));
    }

    #[test]
    fn test_credentials_require_server_and_tokens() {
        let mut state = State::default();
        assert!(state.credentials().is_none());
        state.auth.access_token = Some("a".into());
        state.auth.refresh_token = Some("r".into());
        assert!(state.credentials().is_none());
        state.auth.server_url = Some("http://s".into());
        assert!(state.is_logged_in());
    }

    #[test]
    fn test_clear_session_keeps_server_and_username() {
        let mut state = State::default();
        state.store_credentials(&credentials());
        state.auth.username = Some("ana".into());
        state.sync.last_sync = 42;

        state.clear_session();
        assert!(state.credentials().is_none());
        assert_eq!(state.auth.server_url.as_deref(), Some("http://gallery.local"));
        assert_eq!(state.auth.username.as_deref(), Some("ana"));
        assert_eq!(state.sync.last_sync, 0);
    }

    #[test]
    fn test_handle_persists_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let handle = StateHandle::open(path.clone()).unwrap();

        handle.store_credentials(&credentials()).unwrap();
        handle.set_last_sync(200).unwrap();

        let reloaded = State::load_from(&path).unwrap();
        assert_eq!(reloaded.credentials(), Some(credentials()));
        assert_eq!(reloaded.sync.last_sync, 200);
        assert!(reloaded.sync.database_path.is_some());
    }

    #[test]
    fn test_handles_on_one_file_keep_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let daemon = StateHandle::open(path.clone()).unwrap();
        daemon
            .store_credentials(&Credentials {
                access_token: "old".into(),
                refresh_token: "old-r".into(),
                ..credentials()
            })
            .unwrap();
        let cli = StateHandle::open(path.clone()).unwrap();

        let rotated = Credentials {
            access_token: "new".into(),
            refresh_token: "new-r".into(),
            ..credentials()
        };
        cli.store_credentials(&rotated).unwrap();
        daemon.set_last_sync(200).unwrap();

        assert_eq!(daemon.credentials().unwrap(), Some(rotated.clone()));
        let on_disk = State::load_from(&path).unwrap();
        assert_eq!(on_disk.credentials(), Some(rotated));
        assert_eq!(on_disk.sync.last_sync, 200);

        cli.clear_session().unwrap();
        assert!(daemon.credentials().unwrap().is_none());
        assert_eq!(daemon.last_sync().unwrap(), 0);
    }

    #[test]
    fn test_in_memory_handle_is_shared_between_clones() {
        let handle = StateHandle::in_memory(State::default());
        let other = handle.clone();
        handle.set_last_sync(7).unwrap();
        assert_eq!(other.last_sync().unwrap(), 7);
    }
}
