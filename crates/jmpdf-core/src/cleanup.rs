//! File lifecycle for one album folder: the produced PDF and its source images.

use std::{
    fs,
    future::Future,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::time::sleep;

#[derive(Clone, Copy, Debug)]
pub struct RemovePolicy {
    pub attempts: u32,
    /// Pause between attempts while the file is held open elsewhere.
    pub backoff: Duration,
}

impl Default for RemovePolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Remove `path`, retrying while the platform reports it as in use.
///
/// Never fails: a missing file counts as removed, and anything still present
/// after the last attempt is logged and left behind.
pub async fn safe_remove(path: &Path, policy: RemovePolicy) {
    remove_with(path, policy, |p| tokio::fs::remove_file(p.to_path_buf())).await;
}

/// Retry loop behind [`safe_remove`] with an injectable remover.
///
/// Returns the number of attempts made.
pub async fn remove_with<F, Fut>(path: &Path, policy: RemovePolicy, mut remove: F) -> u32
where
    F: FnMut(&Path) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match remove(path).await {
            Ok(()) => return attempt,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return attempt,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                tracing::debug!(path = %path.display(), attempt, "file in use, retrying removal");
                if attempt < attempts {
                    sleep(policy.backoff).await;
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove file");
                return attempt;
            }
        }
    }
    tracing::warn!(path = %path.display(), attempts, "giving up on removing file still in use");
    attempts
}

/// Scoped cleanup for one album folder and its document.
///
/// Call [`FolderCleanup::run`] on every exit path. If the guard is dropped
/// without it (panic or task cancellation), `Drop` makes one best-effort pass.
#[derive(Debug)]
pub struct FolderCleanup {
    document: PathBuf,
    folder: PathBuf,
    policy: RemovePolicy,
    done: bool,
}

impl FolderCleanup {
    pub fn new(folder: impl Into<PathBuf>, document: impl Into<PathBuf>, policy: RemovePolicy) -> Self {
        Self {
            document: document.into(),
            folder: folder.into(),
            policy,
            done: false,
        }
    }

    pub async fn run(mut self) {
        safe_remove(&self.document, self.policy).await;
        remove_dir(&self.folder).await;
        self.done = true;
    }
}

impl Drop for FolderCleanup {
    // Cannot await here, so this pass blocks.
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(e) = fs::remove_file(&self.document) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.document.display(), error = %e, "failed to remove document");
            }
        }
        if let Err(e) = fs::remove_dir_all(&self.folder) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.folder.display(), error = %e, "failed to remove folder");
            }
        }
    }
}

/// Recursively remove `dir` if it still exists. Failures are logged only.
pub async fn remove_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dir.display(), error = %e, "failed to remove folder"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    fn fast() -> RemovePolicy {
        RemovePolicy {
            attempts: 5,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn locked_file_is_retried_five_times_then_abandoned() {
        let mut calls = 0;
        let attempts = remove_with(Path::new("/tmp/locked.pdf"), fast(), |_| {
            calls += 1;
            ready(Err(io::Error::from(io::ErrorKind::PermissionDenied)))
        })
        .await;
        assert_eq!(attempts, 5);
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn lock_released_mid_way_stops_retrying() {
        let mut calls = 0;
        let attempts = remove_with(Path::new("/tmp/locked.pdf"), fast(), |_| {
            calls += 1;
            ready(if calls < 3 {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                Ok(())
            })
        })
        .await;
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let attempts = remove_with(Path::new("/tmp/x.pdf"), fast(), |_| {
            ready(Err(io::Error::new(io::ErrorKind::Other, "boom")))
        })
        .await;
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn missing_file_counts_as_removed() {
        let path = tmp("jmpdf-missing").with_extension("pdf");
        safe_remove(&path, fast()).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn run_removes_document_and_folder() {
        let folder = tmp("jmpdf-cleanup");
        fs::create_dir_all(folder.join("nested")).unwrap();
        fs::write(folder.join("nested/a.webp"), b"x").unwrap();
        let document = folder.with_extension("pdf");
        fs::write(&document, b"%PDF").unwrap();

        FolderCleanup::new(&folder, &document, fast()).run().await;

        assert!(!folder.exists());
        assert!(!document.exists());
    }

    #[tokio::test]
    async fn remove_dir_clears_tree_and_tolerates_missing() {
        let folder = tmp("jmpdf-cleanup-tree");
        for i in 0..50 {
            let dir = folder.join(format!("{i:03}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("p.webp"), b"x").unwrap();
        }

        remove_dir(&folder).await;
        assert!(!folder.exists());
        remove_dir(&folder).await;
    }

    #[test]
    fn drop_without_run_still_cleans_up() {
        let folder = tmp("jmpdf-cleanup-drop");
        fs::create_dir_all(&folder).unwrap();
        let document = folder.with_extension("pdf");
        fs::write(&document, b"%PDF").unwrap();

        drop(FolderCleanup::new(&folder, &document, fast()));

        assert!(!folder.exists());
        assert!(!document.exists());
    }
}
