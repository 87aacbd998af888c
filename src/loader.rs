use std::borrow::Cow;
use std::path::Path;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::model::Line;

#[async_trait]
pub trait TextLoader: Send + Sync {
    async fn load(&self, path: &Path) -> anyhow::Result<Vec<Line>>;
}

/// Reads a local text file into numbered lines.
///
/// Line numbers are 0-based positions in the file, counted before blank
/// lines are dropped, so they keep pointing at the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTextLoader;

#[async_trait]
impl TextLoader for FileTextLoader {
    async fn load(&self, path: &Path) -> anyhow::Result<Vec<Line>> {
        let text = read_text(path).await?;
        let lines = split_lines(&text)?;
        tracing::debug!(path = %path.display(), lines = lines.len(), "loaded lines");
        Ok(lines)
    }
}

/// Whole file as text, UTF-8 first and the detected encoding otherwise.
pub async fn read_text(path: &Path) -> anyhow::Result<String> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = raw.len(), "read text file");
    Ok(decode(&raw, path).into_owned())
}

fn decode<'a>(raw: &'a [u8], path: &Path) -> Cow<'a, str> {
    if let Ok(text) = std::str::from_utf8(raw) {
        return Cow::Borrowed(text.strip_prefix('\u{feff}').unwrap_or(text));
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(raw, true);
    let encoding = detector.guess(None, true);
    let (text, used, had_errors) = encoding.decode(raw);
    tracing::warn!(
        path = %path.display(),
        encoding = used.name(),
        had_errors,
        "file is not valid UTF-8; decoded with detected encoding"
    );
    text
}

fn split_lines(text: &str) -> anyhow::Result<Vec<Line>> {
    let mut lines = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let line_number = i64::try_from(index).context("line number overflow")?;
        lines.push(Line::new(line_number, raw)?);
    }
    Ok(lines)
}
