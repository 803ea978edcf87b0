use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;

use crate::media::mime_for_extension;

/// Watches the media directory for added, changed or removed media files
pub struct MediaWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl MediaWatcher {
    pub fn new(media_dir: &Path) -> Result<Self> {
        tracing::debug!("watching media directory {}", media_dir.display());
        let (tx, receiver) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                // Receiver gone means the watcher is being dropped
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(media_dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch directory: {}", media_dir.display()))?;

        Ok(Self {
            _watcher: watcher,
            receiver,
        })
    }

    /// Wait for the next event touching a media file.
    ///
    /// Returns `None` once the underlying watcher has shut down.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await? {
                Ok(event) if is_media_event(&event) => return Some(event),
                Ok(_) => continue,
                Err(e) => tracing::warn!("File watcher error: {e}"),
            }
        }
    }
}

fn is_media_event(event: &Event) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    relevant_kind
        && event.paths.iter().any(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .and_then(mime_for_extension)
                .is_some()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind};
    use std::path::PathBuf;

    #[test]
    fn test_only_media_changes_are_relevant() {
        let photo = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/media/Camera/a.jpg"));
        let text = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/media/notes.txt"));
        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/media/Camera/a.jpg"));

        assert!(is_media_event(&photo));
        assert!(!is_media_event(&text));
        assert!(!is_media_event(&access));
    }
}
