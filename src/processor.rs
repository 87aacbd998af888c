//! Chunked LLM processing of a chapter's lines into ordered segments.
//!
//! Chunk calls may run concurrently, but everything that touches the
//! character registry happens on the calling task, one chunk at a time and in
//! chunk order. The whole run fails on the first chunk error; nothing partial
//! is returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::llm::{LlmClient, SamplingParams};
use crate::model::{Line, Segment};
use crate::prompt::PromptTemplate;
use crate::registry::CharacterRegistry;
use crate::response::{self, SegmentRecord};
use crate::schedule;
use crate::store::{BlockCache, CachedBlock};
use crate::work::checksum;

pub const DEFAULT_CHUNK_SIZE: usize = 10;
const RESPONSE_LOG_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorOptions {
    pub chunk_size: usize,
    /// Chunk calls allowed in flight at once; 1 is strictly sequential.
    pub concurrency: usize,
    pub sampling: SamplingParams,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: 1,
            sampling: SamplingParams::pipeline(),
        }
    }
}

/// Cache key prefix for one chapter's blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockScope {
    pub work_id: String,
    pub chapter_id: String,
}

impl BlockScope {
    pub fn new(work_id: impl Into<String>, chapter_id: impl Into<String>) -> Self {
        Self {
            work_id: work_id.into(),
            chapter_id: chapter_id.into(),
        }
    }
}

pub struct BlockProcessor {
    fetcher: BlockFetcher,
    options: ProcessorOptions,
}

impl BlockProcessor {
    pub fn new(
        client: Arc<dyn LlmClient>,
        template: Arc<dyn PromptTemplate>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            fetcher: BlockFetcher {
                client,
                template,
                sampling: options.sampling,
                cache: None,
            },
            options,
        }
    }

    /// Reuses stored records for already-processed chunks and stores new ones.
    pub fn with_cache(mut self, cache: Arc<dyn BlockCache>, scope: BlockScope) -> Self {
        self.fetcher.cache = Some((cache, scope));
        self
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Segments for `lines`, sorted by `(line_number, segment_index)`, with
    /// every speaker resolved through `registry`.
    pub async fn process(
        &self,
        registry: &mut CharacterRegistry,
        lines: &[Line],
        chunk_size: Option<usize>,
        metadata: Option<&Value>,
    ) -> Result<Vec<Segment>> {
        let chunk_size = chunk_size.unwrap_or(self.options.chunk_size);
        let concurrency = self.options.concurrency;
        if concurrency == 0 {
            return Err(PipelineError::invalid_argument("concurrency must be > 0"));
        }

        let payloads = schedule::chunks(lines, chunk_size)?
            .map(|block| build_payload(block, metadata))
            .collect::<Vec<_>>();
        let total_chunks = payloads.len();
        tracing::info!(
            lines = lines.len(),
            chunk_size,
            chunks = total_chunks,
            concurrency,
            "block processing: start"
        );

        let mut join_set = tokio::task::JoinSet::new();
        let mut payloads = payloads.into_iter().enumerate();
        let mut ready: BTreeMap<usize, Vec<ParsedSegment>> = BTreeMap::new();
        let mut next_to_resolve = 0usize;
        let mut segments = Vec::new();

        while next_to_resolve < total_chunks {
            while join_set.len() < concurrency {
                let Some((chunk_index, payload)) = payloads.next() else {
                    break;
                };
                let fetcher = self.fetcher.clone();
                join_set.spawn(async move {
                    tracing::debug!(chunk_index, "process chunk");
                    let parsed = fetcher.fetch(chunk_index, payload).await;
                    (chunk_index, parsed)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (chunk_index, parsed) = joined.map_err(|err| {
                PipelineError::llm(anyhow::Error::new(err).context("join chunk task"))
            })?;
            // Returning here drops the JoinSet, which aborts the chunks still in flight.
            let parsed = parsed.map_err(|err| err.at_chunk(chunk_index))?;
            ready.insert(chunk_index, parsed);

            while let Some(parsed) = ready.remove(&next_to_resolve) {
                resolve_speakers(registry, parsed, &mut segments)
                    .map_err(|err| err.at_chunk(next_to_resolve))?;
                tracing::debug!(
                    chunk_index = next_to_resolve,
                    total = total_chunks,
                    "chunk resolved"
                );
                next_to_resolve += 1;
            }
        }

        segments.sort_by_key(Segment::position);
        tracing::info!(
            segments = segments.len(),
            characters = registry.len(),
            "block processing: done"
        );
        Ok(segments)
    }
}

/// Attaches sorted `segments` to their lines and fills each line's
/// `translated_text` from its segments, joined by a space.
///
/// Segments that name a line not in `lines` are dropped.
pub fn assemble_lines(mut lines: Vec<Line>, segments: Vec<Segment>) -> Vec<Line> {
    let by_number = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| line.position().map(|number| (number, idx)))
        .collect::<BTreeMap<_, _>>();

    for segment in segments {
        match by_number.get(&segment.line_number) {
            Some(&idx) => lines[idx].segments.push(segment),
            None => tracing::warn!(
                line_number = segment.line_number,
                segment_index = segment.segment_index,
                "segment refers to an unknown line; dropping it"
            ),
        }
    }

    for line in &mut lines {
        let translated = line
            .segments
            .iter()
            .filter_map(|segment| segment.translated_text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>();
        if !translated.is_empty() {
            line.translated_text = Some(translated.join(" "));
        }
    }
    lines
}

fn build_payload(block: &[Line], metadata: Option<&Value>) -> Value {
    let lines = block
        .iter()
        .map(|line| {
            serde_json::json!({
                "line_number": line.line_number,
                "text": line.original_text,
            })
        })
        .collect::<Vec<_>>();

    let mut payload = serde_json::json!({ "lines": lines });
    if let Some(metadata) = metadata.filter(|metadata| !is_empty_metadata(metadata))
        && let Some(object) = payload.as_object_mut()
    {
        object.insert("metadata".to_owned(), metadata.clone());
    }
    payload
}

fn is_empty_metadata(metadata: &Value) -> bool {
    match metadata {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// A validated record whose speaker is not resolved yet.
struct ParsedSegment {
    record: SegmentRecord,
    segment: Segment,
}

fn parse_records(values: Vec<Value>) -> Result<Vec<ParsedSegment>> {
    response::segment_records(values)?
        .into_iter()
        .enumerate()
        .map(|(position, record)| {
            let segment = record.to_segment(position)?;
            Ok(ParsedSegment { record, segment })
        })
        .collect()
}

fn resolve_speakers(
    registry: &mut CharacterRegistry,
    parsed: Vec<ParsedSegment>,
    out: &mut Vec<Segment>,
) -> Result<()> {
    for ParsedSegment { record, mut segment } in parsed {
        let character = registry.upsert(record.speaker(), record.character_type, record.gender)?;
        segment.character = Some(character);
        out.push(segment);
    }
    Ok(())
}

/// The per-chunk work that can leave the calling task: cache lookup, the LLM
/// call and response validation.
#[derive(Clone)]
struct BlockFetcher {
    client: Arc<dyn LlmClient>,
    template: Arc<dyn PromptTemplate>,
    sampling: SamplingParams,
    cache: Option<(Arc<dyn BlockCache>, BlockScope)>,
}

impl BlockFetcher {
    async fn fetch(&self, chunk_index: usize, payload: Value) -> Result<Vec<ParsedSegment>> {
        let digest = payload_digest(&payload);
        if let Some(parsed) = self.cached(chunk_index, &digest).await {
            return Ok(parsed);
        }

        let messages = self
            .template
            .build_messages(&payload)
            .map_err(|err| PipelineError::llm(err.context("build prompt messages")))?;
        let reply = self
            .client
            .chat(&messages, &self.sampling)
            .await
            .map_err(PipelineError::llm)?;
        tracing::debug!(
            chunk_index,
            response = response::preview(&reply.text, RESPONSE_LOG_CHARS),
            "llm response"
        );

        let values = response::record_values(&reply.text, "segments")?;
        let parsed = parse_records(values.clone())?;
        self.store(chunk_index, CachedBlock::new(digest, values)).await;
        Ok(parsed)
    }

    /// Records stored for this chunk, provided they answered the same payload.
    async fn cached(&self, chunk_index: usize, digest: &str) -> Option<Vec<ParsedSegment>> {
        let (cache, scope) = self.cache.as_ref()?;
        let block = match cache
            .load_block(&scope.work_id, &scope.chapter_id, chunk_index)
            .await
        {
            Ok(block) => block?,
            Err(err) => {
                tracing::warn!(chunk_index, "block cache read failed: {err:#}");
                return None;
            }
        };
        if block.digest != digest {
            tracing::debug!(chunk_index, "cached block was built from other lines; calling llm");
            return None;
        }

        match parse_records(block.records) {
            Ok(parsed) => {
                tracing::debug!(chunk_index, segments = parsed.len(), "block cache hit");
                Some(parsed)
            }
            Err(err) => {
                tracing::warn!(chunk_index, %err, "cached block is invalid; calling llm");
                None
            }
        }
    }

    async fn store(&self, chunk_index: usize, block: CachedBlock) {
        let Some((cache, scope)) = &self.cache else {
            return;
        };
        if let Err(err) = cache
            .save_block(&scope.work_id, &scope.chapter_id, chunk_index, &block)
            .await
        {
            tracing::warn!(chunk_index, "block cache write failed: {err:#}");
        }
    }
}

/// Identity of a chunk request: which lines, with which text and metadata.
fn payload_digest(payload: &Value) -> String {
    checksum(&payload.to_string())
}
