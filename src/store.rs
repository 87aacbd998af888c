use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

use crate::config::DataLayout;
use crate::work::{WorkMetadata, validate_work_id};

/// Raw LLM records of one processed chunk, bound to the request that
/// produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBlock {
    /// sha-256 of the chunk's request payload.
    pub digest: String,
    pub records: Vec<Value>,
}

impl CachedBlock {
    pub fn new(digest: impl Into<String>, records: Vec<Value>) -> Self {
        Self {
            digest: digest.into(),
            records,
        }
    }
}

/// Processed chunks keyed by `(work, chapter, block index)`.
#[async_trait]
pub trait BlockCache: Send + Sync {
    async fn load_block(
        &self,
        work_id: &str,
        chapter_id: &str,
        block_index: usize,
    ) -> anyhow::Result<Option<CachedBlock>>;

    async fn save_block(
        &self,
        work_id: &str,
        chapter_id: &str,
        block_index: usize,
        block: &CachedBlock,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct LocalFsBlockCache {
    layout: DataLayout,
}

impl LocalFsBlockCache {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl BlockCache for LocalFsBlockCache {
    async fn load_block(
        &self,
        work_id: &str,
        chapter_id: &str,
        block_index: usize,
    ) -> anyhow::Result<Option<CachedBlock>> {
        let path = self.layout.block_path(work_id, chapter_id, block_index);
        read_json_or_discard(&path).await
    }

    async fn save_block(
        &self,
        work_id: &str,
        chapter_id: &str,
        block_index: usize,
        block: &CachedBlock,
    ) -> anyhow::Result<()> {
        let path = self.layout.block_path(work_id, chapter_id, block_index);
        write_json_atomic(&path, block).await
    }
}

/// Processing record of one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub checksum: String,
    #[serde(default)]
    pub title: String,
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub segments: usize,
    #[serde(default)]
    pub scenarios: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub chapters: BTreeMap<String, ChapterEntry>,
}

impl Manifest {
    /// True when `chapter_id` was processed from text with this checksum.
    pub fn is_current(&self, chapter_id: &str, checksum: &str) -> bool {
        self.chapters
            .get(chapter_id)
            .is_some_and(|entry| entry.checksum == checksum)
    }
}

/// Whole-document manifest persistence per work.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Missing or unreadable manifests load as empty.
    async fn load(&self, work_id: &str) -> anyhow::Result<Manifest>;
    async fn save(&self, work_id: &str, manifest: &Manifest) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct LocalFsManifestStore {
    layout: DataLayout,
}

impl LocalFsManifestStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl ManifestStore for LocalFsManifestStore {
    async fn load(&self, work_id: &str) -> anyhow::Result<Manifest> {
        let path = self.layout.manifest_path(work_id);
        Ok(read_json_or_discard(&path).await?.unwrap_or_default())
    }

    async fn save(&self, work_id: &str, manifest: &Manifest) -> anyhow::Result<()> {
        let path = self.layout.manifest_path(work_id);
        write_json_atomic(&path, manifest).await
    }
}

/// Registered works under `input/`.
#[derive(Debug, Clone)]
pub struct WorkStore {
    layout: DataLayout,
}

impl WorkStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Creates the directory layout and metadata for a new work.
    pub async fn create(&self, metadata: &WorkMetadata) -> anyhow::Result<String> {
        let work_id = metadata.work_id()?;
        let metadata_path = self.layout.metadata_path(&work_id);
        if fs::try_exists(&metadata_path)
            .await
            .with_context(|| format!("stat {}", metadata_path.display()))?
        {
            anyhow::bail!("work already exists: {work_id}");
        }

        let chapters_dir = self.layout.chapters_dir(&work_id);
        fs::create_dir_all(&chapters_dir)
            .await
            .with_context(|| format!("create dir: {}", chapters_dir.display()))?;
        let output_dir = self.layout.output_dir(&work_id);
        fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("create dir: {}", output_dir.display()))?;

        write_json_atomic(&metadata_path, metadata).await?;
        write_json_atomic(&self.layout.manifest_path(&work_id), &Manifest::default()).await?;
        tracing::info!(work_id = %work_id, title = %metadata.title, "work created");
        Ok(work_id)
    }

    pub async fn get(&self, work_id: &str) -> anyhow::Result<Option<WorkMetadata>> {
        validate_work_id(work_id)?;
        let path = self.layout.metadata_path(work_id);
        read_json(&path)
            .await
            .with_context(|| format!("read {}", path.display()))
    }

    /// Replaces the metadata of an existing work. The work id never changes.
    pub async fn put(&self, work_id: &str, metadata: &WorkMetadata) -> anyhow::Result<()> {
        if self.get(work_id).await?.is_none() {
            anyhow::bail!("work not found: {work_id}");
        }
        write_json_atomic(&self.layout.metadata_path(work_id), metadata).await
    }

    /// Removes every directory belonging to a work; returns the ones removed.
    pub async fn delete(&self, work_id: &str) -> anyhow::Result<Vec<PathBuf>> {
        validate_work_id(work_id)?;
        let dirs = [
            self.layout.work_dir(work_id),
            self.layout.work_store_dir(work_id),
            self.layout.output_dir(work_id),
        ];

        let mut removed = Vec::new();
        for dir in dirs {
            match fs::remove_dir_all(&dir).await {
                Ok(()) => removed.push(dir),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("remove {}", dir.display()));
                }
            }
        }
        tracing::info!(work_id, removed = removed.len(), "work deleted");
        Ok(removed)
    }

    /// Every work with readable metadata, sorted by id.
    pub async fn list(&self) -> anyhow::Result<Vec<(String, WorkMetadata)>> {
        let input_root = self.layout.input_root();
        let mut entries = match fs::read_dir(&input_root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read dir {}", input_root.display()));
            }
        };

        let mut works = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(work_id) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            match self.get(&work_id).await {
                Ok(Some(metadata)) => works.push((work_id, metadata)),
                Ok(None) => {}
                Err(err) => tracing::warn!(work_id = %work_id, "skip work: {err:#}"),
            }
        }
        works.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(works)
    }

    /// Chapter ids (file stems) of the `*.txt` files in a work, sorted.
    pub async fn chapter_ids(&self, work_id: &str) -> anyhow::Result<Vec<String>> {
        validate_work_id(work_id)?;
        let dir = self.layout.chapters_dir(work_id);
        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("read dir {}", dir.display()))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "txt")
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                ids.push(stem.to_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

/// Like `read_json`, but a file that does not parse counts as absent.
async fn read_json_or_discard<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "ignoring unreadable json file");
            Ok(None)
        }
    }
}

pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
