use gallery_core::{GalleryError, Result};

/// Run a SQLite or state-file operation on the blocking pool.
///
/// The stores guard their connection with a std mutex, so they are never
/// called directly from a runtime worker.
pub(crate) async fn on_blocking_pool<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GalleryError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_errors_and_panics_surface_as_results() {
        assert_eq!(on_blocking_pool(|| Ok(7)).await.unwrap(), 7);

        let err = on_blocking_pool::<(), _>(|| Err(GalleryError::SessionExpired))
            .await
            .unwrap_err();
        assert!(err.is_session_expired());

        let err = on_blocking_pool::<(), _>(|| panic!("worker died")).await.unwrap_err();
        assert!(matches!(err, GalleryError::Worker(_)));
    }
}
