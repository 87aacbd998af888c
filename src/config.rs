use std::path::{Path, PathBuf};

use anyhow::Context as _;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DATA_DIR: &str = "data";

/// Connection settings for the chat completions endpoint.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: url::Url,
    pub model: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        let raw_base_url = get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let base_url = url::Url::parse(raw_base_url.trim())
            .with_context(|| format!("invalid OPENAI_BASE_URL: {raw_base_url}"))?;
        anyhow::ensure!(
            matches!(base_url.scheme(), "http" | "https"),
            "OPENAI_BASE_URL must be http(s): {base_url}"
        );

        let model = get("CHAPTERFORGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned());
        let timeout_secs = match get("CHAPTERFORGE_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid CHAPTERFORGE_TIMEOUT_SECS: {raw}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            timeout_secs,
        })
    }
}

/// On-disk layout under one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_root(&self) -> PathBuf {
        self.root.join("input")
    }

    pub fn work_dir(&self, work_id: &str) -> PathBuf {
        self.input_root().join(work_id)
    }

    pub fn chapters_dir(&self, work_id: &str) -> PathBuf {
        self.work_dir(work_id).join("chapters")
    }

    pub fn metadata_path(&self, work_id: &str) -> PathBuf {
        self.work_dir(work_id).join("metadata.json")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Manifest and block cache of one work.
    pub fn work_store_dir(&self, work_id: &str) -> PathBuf {
        self.store_dir().join(work_id)
    }

    pub fn manifest_path(&self, work_id: &str) -> PathBuf {
        self.work_store_dir(work_id).join("manifest.json")
    }

    pub fn block_path(&self, work_id: &str, chapter_id: &str, block_index: usize) -> PathBuf {
        self.work_store_dir(work_id)
            .join("blocks")
            .join(chapter_id)
            .join(format!("block_{block_index}.json"))
    }

    pub fn output_dir(&self, work_id: &str) -> PathBuf {
        self.root.join("output").join(work_id)
    }

    pub fn chapter_output_path(&self, work_id: &str, chapter_id: &str) -> PathBuf {
        self.output_dir(work_id).join(format!("{chapter_id}.json"))
    }

    pub fn characters_output_path(&self, work_id: &str, chapter_id: &str) -> PathBuf {
        self.output_dir(work_id)
            .join(format!("{chapter_id}.characters.json"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_with_only_api_key() -> anyhow::Result<()> {
        let config = LlmConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]))?;
        assert_eq!(config.base_url.as_str(), "https://api.openai.com/v1");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(!format!("{config:?}").contains("sk-test"));
        Ok(())
    }

    #[test]
    fn env_overrides_are_validated() -> anyhow::Result<()> {
        let config = LlmConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://127.0.0.1:8080/v1"),
            ("CHAPTERFORGE_MODEL", "gpt-4o-mini"),
            ("CHAPTERFORGE_TIMEOUT_SECS", "30"),
        ]))?;
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:8080/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout_secs, 30);

        assert!(LlmConfig::from_lookup(lookup(&[])).is_err());
        assert!(
            LlmConfig::from_lookup(lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_BASE_URL", "not a url"),
            ]))
            .is_err()
        );
        assert!(
            LlmConfig::from_lookup(lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("CHAPTERFORGE_TIMEOUT_SECS", "soon"),
            ]))
            .is_err()
        );
        Ok(())
    }

    #[test]
    fn layout_paths() {
        let layout = DataLayout::new("/tmp/data");
        assert_eq!(
            layout.chapters_dir("obra"),
            Path::new("/tmp/data/input/obra/chapters")
        );
        assert_eq!(
            layout.manifest_path("obra"),
            Path::new("/tmp/data/store/obra/manifest.json")
        );
        assert_eq!(
            layout.block_path("obra", "001", 3),
            Path::new("/tmp/data/store/obra/blocks/001/block_3.json")
        );
        assert_eq!(
            layout.characters_output_path("obra", "001"),
            Path::new("/tmp/data/output/obra/001.characters.json")
        );
    }
}
