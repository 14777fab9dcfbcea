use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::compute_path_hash;

/// What a worktree remembers about the session that created it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub runtime_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_dirs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub non_interactive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn write(&self, worktree: &Path, metadata: &WorktreeMetadata) -> Result<()>;
    async fn read(&self, worktree: &Path) -> Result<Option<WorktreeMetadata>>;
    async fn remove(&self, worktree: &Path) -> Result<()>;
}

/// One JSON file per worktree, named by a hash of the worktree path.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    dir: PathBuf,
}

impl FileMetadataStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("worktrees"))
    }

    pub fn file_for(&self, worktree: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", compute_path_hash(worktree)))
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn write(&self, worktree: &Path, metadata: &WorktreeMetadata) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {:?}", self.dir))?;
        let json = serde_json::to_string_pretty(metadata)?;
        let file = self.file_for(worktree);
        tokio::fs::write(&file, json)
            .await
            .with_context(|| format!("Failed to write metadata: {:?}", file))
    }

    async fn read(&self, worktree: &Path) -> Result<Option<WorktreeMetadata>> {
        let file = self.file_for(worktree);
        let content = match tokio::fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", file)),
        };
        let metadata = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse metadata: {:?}", file))?;
        Ok(Some(metadata))
    }

    async fn remove(&self, worktree: &Path) -> Result<()> {
        match tokio::fs::remove_file(self.file_for(worktree)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryMetadataStore {
        entries: Mutex<HashMap<PathBuf, WorktreeMetadata>>,
    }

    impl MemoryMetadataStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(&self, worktree: &Path) -> Option<WorktreeMetadata> {
            self.entries.lock().unwrap().get(worktree).cloned()
        }

        pub fn insert(&self, worktree: &Path, metadata: WorktreeMetadata) {
            self.entries
                .lock()
                .unwrap()
                .insert(worktree.to_path_buf(), metadata);
        }
    }

    #[async_trait]
    impl MetadataStore for MemoryMetadataStore {
        async fn write(&self, worktree: &Path, metadata: &WorktreeMetadata) -> Result<()> {
            self.insert(worktree, metadata.clone());
            Ok(())
        }

        async fn read(&self, worktree: &Path) -> Result<Option<WorktreeMetadata>> {
            Ok(self.get(worktree))
        }

        async fn remove(&self, worktree: &Path) -> Result<()> {
            self.entries.lock().unwrap().remove(worktree);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn metadata_serializes_camel_case_and_omits_empty_fields() {
        let metadata = WorktreeMetadata {
            session_id: Some("abc".into()),
            runtime_id: "claude".into(),
            task_description: Some("fix it".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"sessionId": "abc", "runtimeId": "claude", "taskDescription": "fix it"})
        );
    }

    #[test]
    fn metadata_reads_minimal_file() {
        let parsed: WorktreeMetadata = serde_json::from_str(r#"{"runtimeId":"codex"}"#).unwrap();
        assert_eq!(parsed.runtime_id, "codex");
        assert!(parsed.session_id.is_none());
        assert!(!parsed.non_interactive);
    }

    #[tokio::test]
    async fn file_store_write_read_remove() {
        let tmp = TempDir::new().unwrap();
        let store = FileMetadataStore::from_data_dir(tmp.path());
        let worktree = tmp.path().join("wt");

        assert_eq!(store.read(&worktree).await.unwrap(), None);

        let metadata = WorktreeMetadata {
            runtime_id: "claude".into(),
            additional_dirs: vec!["/shared".into()],
            non_interactive: true,
            ..Default::default()
        };
        store.write(&worktree, &metadata).await.unwrap();
        assert_eq!(store.read(&worktree).await.unwrap(), Some(metadata));

        store.remove(&worktree).await.unwrap();
        assert_eq!(store.read(&worktree).await.unwrap(), None);
        store
            .remove(&worktree)
            .await
            .expect("remove: missing file should not be an error");
    }

    #[tokio::test]
    async fn file_store_keys_by_path() {
        let tmp = TempDir::new().unwrap();
        let store = FileMetadataStore::new(tmp.path().to_path_buf());
        assert_ne!(
            store.file_for(Path::new("/a/one")),
            store.file_for(Path::new("/a/two"))
        );
    }
}
