use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A media file discovered in the device's media index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAsset {
    /// Identifier assigned by the media index, stable on this device
    pub id: String,

    /// Location of the file on disk
    pub path: PathBuf,

    pub mime_type: String,

    /// Content fingerprint, absent until computed or loaded from the cache
    #[serde(default)]
    pub fingerprint: Option<String>,

    /// Server identity once uploaded or matched
    #[serde(default)]
    pub remote_id: Option<String>,

    /// Capture time in epoch milliseconds
    pub timestamp: i64,
}

impl LocalAsset {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        mime_type: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            mime_type: mime_type.into(),
            fingerprint: None,
            remote_id: None,
            timestamp,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }
}

/// An asset known to the server catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub id: String,
    pub fingerprint: String,
    /// Server creation time
    pub timestamp: i64,
}

impl RemoteAsset {
    pub fn new(id: impl Into<String>, fingerprint: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            fingerprint: fingerprint.into(),
            timestamp,
        }
    }
}

/// One entry of the merged gallery view.
///
/// A `Merged` entry is produced when a local file and a remote asset share a
/// fingerprint; it keeps the local file's path and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    Local(LocalAsset),
    Remote(RemoteAsset),
    Merged {
        local: LocalAsset,
        remote_id: String,
    },
}

impl Asset {
    pub fn timestamp(&self) -> i64 {
        match self {
            Asset::Local(local) | Asset::Merged { local, .. } => local.timestamp,
            Asset::Remote(remote) => remote.timestamp,
        }
    }

    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            Asset::Local(local) | Asset::Merged { local, .. } => local.fingerprint.as_deref(),
            Asset::Remote(remote) => Some(&remote.fingerprint),
        }
    }

    pub fn local_id(&self) -> Option<&str> {
        match self {
            Asset::Local(local) | Asset::Merged { local, .. } => Some(&local.id),
            Asset::Remote(_) => None,
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Asset::Local(local) => local.remote_id.as_deref(),
            Asset::Remote(remote) => Some(&remote.id),
            Asset::Merged { remote_id, .. } => Some(remote_id),
        }
    }

    /// Identity used for display and as the ordering tie-break
    pub fn display_id(&self) -> &str {
        match self {
            Asset::Local(local) | Asset::Merged { local, .. } => &local.id,
            Asset::Remote(remote) => &remote.id,
        }
    }

    pub fn is_local(&self) -> bool {
        self.local_id().is_some()
    }

    pub fn is_remote(&self) -> bool {
        self.remote_id().is_some()
    }

    /// Link a local entry to the server identity it was uploaded as.
    ///
    /// Returns false if the entry already had a remote identity.
    pub fn attach_remote(&mut self, remote_id: &str) -> bool {
        match self {
            Asset::Local(local) if local.remote_id.is_none() => {
                let mut local = local.clone();
                local.remote_id = Some(remote_id.to_string());
                *self = Asset::Merged {
                    local,
                    remote_id: remote_id.to_string(),
                };
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_by_variant() {
        let local = LocalAsset::new("l1", "/media/a.jpg", "image/jpeg", 10).with_fingerprint("fp");
        let remote = RemoteAsset::new("r1", "fp", 20);

        let a = Asset::Local(local.clone());
        assert_eq!(a.local_id(), Some("l1"));
        assert_eq!(a.remote_id(), None);
        assert_eq!(a.fingerprint(), Some("fp"));

        let b = Asset::Remote(remote);
        assert_eq!(b.local_id(), None);
        assert_eq!(b.remote_id(), Some("r1"));
        assert_eq!(b.timestamp(), 20);

        let c = Asset::Merged {
            local,
            remote_id: "r1".into(),
        };
        assert!(c.is_local() && c.is_remote());
        assert_eq!(c.timestamp(), 10);
    }

    #[test]
    fn test_attach_remote_only_once() {
        let mut asset = Asset::Local(LocalAsset::new("l1", "/a.jpg", "image/jpeg", 1));
        assert!(asset.attach_remote("r9"));
        assert_eq!(asset.remote_id(), Some("r9"));
        assert!(!asset.attach_remote("r10"));
        assert_eq!(asset.remote_id(), Some("r9"));
    }
}
