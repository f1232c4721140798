use crate::util::tokio::spawn_blocking;
use std::path::Path;
use tempfile::TempDir;

/// Creates a uniquely named directory under `root`, creating `root` itself
/// if it doesn't exist yet. The directory is removed when the returned value
/// is dropped.
pub(crate) async fn create_temp_dir_in(root: &Path, prefix: &str) -> std::io::Result<TempDir> {
    let root = root.to_path_buf();
    let prefix = prefix.to_owned();
    spawn_blocking(move || {
        std::fs::create_dir_all(&root)?;
        tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn creates_missing_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("nested/scratch");

        let dir = create_temp_dir_in(&root, "gif-encode-").await.unwrap();

        assert!(dir.path().starts_with(&root));
        let name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("gif-encode-"), "{name}");

        let path = dir.path().to_owned();
        drop(dir);
        assert!(!path.exists());
        assert!(root.exists());
    }
}
