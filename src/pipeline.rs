//! Command implementations behind the `work` and `chapter` subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;

use crate::cli::{
    ChapterProcessArgs, CostCalcArgs, CostFileArgs, CostReportArgs, OutputFormat, WorkCreateArgs,
    WorkDeleteArgs, WorkIdArgs, WorkUpdateArgs,
};
use crate::config::{DataLayout, LlmConfig};
use crate::cost::{self, CostEstimate};
use crate::llm::{LlmClient, SamplingParams};
use crate::loader::{FileTextLoader, TextLoader as _, read_text};
use crate::model::{Chapter, Line, LlmUsage};
use crate::openai::OpenAiChatClient;
use crate::processor::{BlockProcessor, BlockScope, ProcessorOptions, assemble_lines};
use crate::prompt::{PipelinePrompt, ScenarioPrompt};
use crate::registry::CharacterRegistry;
use crate::scenario::ScenarioExtractor;
use crate::store::{
    ChapterEntry, LocalFsBlockCache, LocalFsManifestStore, ManifestStore as _, WorkStore,
    write_json_atomic,
};
use crate::work::{WorkMetadata, checksum, safe_filename};

pub async fn work_create(layout: &DataLayout, args: WorkCreateArgs) -> anyhow::Result<()> {
    let mut metadata = WorkMetadata::new(&args.title)?;
    metadata.original_language = args.original_language;
    metadata.author = args.author;
    metadata.tags = clean_tags(args.tags);

    let work_id = WorkStore::new(layout.clone()).create(&metadata).await?;
    println!("work_id: {work_id}");
    println!("chapters: {}", layout.chapters_dir(&work_id).display());
    Ok(())
}

pub async fn work_list(layout: &DataLayout) -> anyhow::Result<()> {
    let works = WorkStore::new(layout.clone()).list().await?;
    if works.is_empty() {
        println!("no works found under {}", layout.input_root().display());
        return Ok(());
    }
    for (work_id, metadata) in works {
        println!("{work_id}\t{}", metadata.title);
        println!("  language: {}", metadata.original_language);
        println!("  author:   {}", metadata.author);
        println!("  tags:     {}", metadata.tags.join(", "));
    }
    Ok(())
}

pub async fn work_update(layout: &DataLayout, args: WorkUpdateArgs) -> anyhow::Result<()> {
    let store = WorkStore::new(layout.clone());
    let mut metadata = store
        .get(&args.work_id)
        .await?
        .with_context(|| format!("work not found: {}", args.work_id))?;

    if let Some(title) = args.title {
        metadata.title = title;
    }
    if let Some(language) = args.original_language {
        metadata.original_language = language;
    }
    if let Some(author) = args.author {
        metadata.author = author;
    }
    if let Some(tags) = args.tags {
        metadata.tags = clean_tags(tags);
    }

    store.put(&args.work_id, &metadata).await?;
    println!("updated {}", args.work_id);
    Ok(())
}

pub async fn work_chapters(layout: &DataLayout, args: WorkIdArgs) -> anyhow::Result<()> {
    let chapter_ids = WorkStore::new(layout.clone())
        .chapter_ids(&args.work_id)
        .await
        .with_context(|| format!("work not found: {}", args.work_id))?;
    let manifest = LocalFsManifestStore::new(layout.clone())
        .load(&args.work_id)
        .await?;

    for chapter_id in &chapter_ids {
        let status = if manifest.chapters.contains_key(chapter_id) {
            "processed"
        } else {
            "pending"
        };
        println!("{chapter_id}.txt\t{status}");
    }
    println!("total: {}", chapter_ids.len());
    Ok(())
}

pub async fn work_delete(layout: &DataLayout, args: WorkDeleteArgs) -> anyhow::Result<()> {
    if !args.yes {
        anyhow::bail!(
            "refusing to delete {} without --yes (this removes all of its data)",
            args.work_id
        );
    }
    let removed = WorkStore::new(layout.clone()).delete(&args.work_id).await?;
    if removed.is_empty() {
        anyhow::bail!("work not found: {}", args.work_id);
    }
    for dir in removed {
        println!("removed {}", dir.display());
    }
    Ok(())
}

pub async fn chapter_process(layout: &DataLayout, args: ChapterProcessArgs) -> anyhow::Result<()> {
    let config = LlmConfig::from_env().context("load llm config")?;
    let client: Arc<dyn LlmClient> = Arc::new(OpenAiChatClient::new(&config)?);

    match process_chapter(layout, client, &args).await? {
        ChapterOutcome::UpToDate { chapter_id } => {
            println!("{chapter_id}: up to date (use --force to reprocess)");
        }
        ChapterOutcome::Processed {
            chapter_id,
            segments,
            scenarios,
            characters,
            output,
        } => {
            println!(
                "{chapter_id}: {segments} segments, {scenarios} scenarios, {characters} characters"
            );
            println!("output: {}", output.display());
        }
    }
    Ok(())
}

pub async fn cost_calc(args: CostCalcArgs) -> anyhow::Result<()> {
    let total = args
        .input_tokens
        .checked_add(args.output_tokens)
        .context("token counts overflow")?;
    let usage = LlmUsage::new(args.input_tokens, args.output_tokens, total)?;
    report_cost(&args.report, &usage, args.tts_chars).await
}

/// Output tokens are estimated from the text; so are input tokens unless given.
pub async fn cost_file(args: CostFileArgs) -> anyhow::Result<()> {
    let text = read_text(&args.path).await?;
    let estimated = cost::estimate_tokens(&text);
    let input_tokens = args.input_tokens.unwrap_or(estimated);
    let total = input_tokens
        .checked_add(estimated)
        .context("token counts overflow")?;
    let usage = LlmUsage::new(input_tokens, estimated, total)?;
    let chars = u64::try_from(text.chars().count()).context("character count overflow")?;
    report_cost(&args.report, &usage, chars).await
}

async fn report_cost(report: &CostReportArgs, usage: &LlmUsage, tts_chars: u64) -> anyhow::Result<()> {
    let pricing = cost::pricing_for(&report.model)?;
    let estimate = CostEstimate::new(pricing, usage, tts_chars);

    match report.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&estimate)?);
        }
        OutputFormat::Text => {
            let rate = if report.live_rate {
                match cost::fetch_usd_brl_rate().await {
                    Ok(rate) => Some(rate),
                    Err(err) => {
                        tracing::warn!("exchange rate unavailable: {err:#}");
                        None
                    }
                }
            } else {
                report.brl_rate
            };
            print!("{}", estimate.render_text(rate));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    UpToDate {
        chapter_id: String,
    },
    Processed {
        chapter_id: String,
        segments: usize,
        scenarios: usize,
        characters: usize,
        output: PathBuf,
    },
}

/// Loads, processes and writes out one chapter, recording it in the manifest.
pub async fn process_chapter(
    layout: &DataLayout,
    client: Arc<dyn LlmClient>,
    args: &ChapterProcessArgs,
) -> anyhow::Result<ChapterOutcome> {
    let work_id = args.work.as_str();
    let work = WorkStore::new(layout.clone())
        .get(work_id)
        .await?
        .with_context(|| format!("work not found: {work_id}"))?;

    let path = resolve_chapter_path(layout, work_id, &args.chapter)?;
    let chapter_id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(safe_filename)
        .filter(|id| id.chars().any(|c| c.is_ascii_alphanumeric()))
        .with_context(|| format!("chapter path has no usable name: {}", path.display()))?;

    let lines = FileTextLoader.load(&path).await?;
    let digest = checksum(&source_text(&lines));

    let manifests = LocalFsManifestStore::new(layout.clone());
    let mut manifest = manifests.load(work_id).await?;
    if !args.force && manifest.is_current(&chapter_id, &digest) {
        tracing::info!(work_id, chapter_id = %chapter_id, "chapter unchanged; skipping");
        return Ok(ChapterOutcome::UpToDate { chapter_id });
    }

    let mut sampling = SamplingParams::pipeline();
    if let Some(temperature) = args.temperature {
        sampling.temperature = temperature;
    }
    sampling.max_tokens = args.max_tokens;
    let options = ProcessorOptions {
        chunk_size: args.chunk_size,
        concurrency: args.concurrency,
        sampling,
    };

    tracing::info!(
        work_id,
        chapter_id = %chapter_id,
        path = %path.display(),
        lines = lines.len(),
        "process chapter"
    );
    let processor = BlockProcessor::new(client.clone(), Arc::new(PipelinePrompt::default()), options)
        .with_cache(
            Arc::new(LocalFsBlockCache::new(layout.clone())),
            BlockScope::new(work_id, &chapter_id),
        );
    let metadata = serde_json::json!({
        "work_id": work_id,
        "title": work.title,
        "original_language": work.original_language,
    });

    let mut registry = CharacterRegistry::new();
    let segments = processor
        .process(&mut registry, &lines, None, Some(&metadata))
        .await
        .with_context(|| format!("process chapter {chapter_id}"))?;
    let segment_count = segments.len();

    let title = args.title.clone().unwrap_or_else(|| chapter_id.clone());
    let mut chapter = Chapter::new(&chapter_id, work_id, title)?;
    for line in assemble_lines(lines, segments) {
        chapter.add_line(line)?;
    }

    if !args.no_scenarios {
        let scenarios = ScenarioExtractor::new(client, Arc::new(ScenarioPrompt))
            .extract(&chapter)
            .await
            .with_context(|| format!("extract scenarios for chapter {chapter_id}"))?;
        for scenario in scenarios {
            chapter.add_scenario(scenario)?;
        }
    }

    let output = layout.chapter_output_path(work_id, &chapter_id);
    write_json_atomic(&output, &chapter.to_value()).await?;
    let characters = registry.snapshot();
    write_json_atomic(
        &layout.characters_output_path(work_id, &chapter_id),
        &characters,
    )
    .await?;

    manifest.chapters.insert(
        chapter_id.clone(),
        ChapterEntry {
            checksum: digest,
            title: chapter.title.clone(),
            processed_at: Utc::now(),
            segments: segment_count,
            scenarios: chapter.scenarios.len(),
        },
    );
    manifests.save(work_id, &manifest).await?;

    tracing::info!(work_id, chapter_id = %chapter_id, output = %output.display(), "chapter written");
    Ok(ChapterOutcome::Processed {
        chapter_id,
        segments: segment_count,
        scenarios: chapter.scenarios.len(),
        characters: characters.len(),
        output,
    })
}

/// `chapter` is either a file path or an id under the work's `chapters/`.
fn resolve_chapter_path(layout: &DataLayout, work_id: &str, chapter: &str) -> anyhow::Result<PathBuf> {
    let direct = Path::new(chapter);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }

    let chapters_dir = layout.chapters_dir(work_id);
    for candidate in [
        chapters_dir.join(format!("{chapter}.txt")),
        chapters_dir.join(chapter),
    ] {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    anyhow::bail!(
        "chapter not found: {chapter} (looked for a file and under {})",
        chapters_dir.display()
    )
}

fn source_text(lines: &[Line]) -> String {
    lines
        .iter()
        .map(|line| format!("{}\t{}", line.line_number, line.original_text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|tag| tag.trim().to_owned())
        .filter(|tag| !tag.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::model::{LlmMessage, LlmResponse};
    use crate::store::{BlockCache as _, Manifest};

    /// Echoes one narration segment per requested line; answers scenario
    /// requests with a single scenario.
    #[derive(Default)]
    struct EchoClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for EchoClient {
        async fn chat(
            &self,
            messages: &[LlmMessage],
            _params: &SamplingParams,
        ) -> anyhow::Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let user = &messages[1].content;
            let Ok(payload) = serde_json::from_str::<Value>(user) else {
                return Ok(LlmResponse::text(
                    r#"{"scenarios": [{"index": 0, "text": "Uma sala de aula vazia.", "location": "Sala"}]}"#,
                ));
            };
            let segments = payload["lines"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|line| {
                    serde_json::json!({
                        "line_number": line["line_number"],
                        "segment_index": 0,
                        "original_text": line["text"],
                        "translated_text": format!("pt: {}", line["text"].as_str().unwrap_or("")),
                        "segment_type": "narration",
                        "speaker": "Narrador",
                        "character_type": "narrator",
                    })
                })
                .collect::<Vec<_>>();
            Ok(LlmResponse::text(
                serde_json::json!({ "segments": segments }).to_string(),
            ))
        }
    }

    fn args(work: &str, chapter: &str) -> ChapterProcessArgs {
        ChapterProcessArgs {
            work: work.to_owned(),
            chapter: chapter.to_owned(),
            title: None,
            chunk_size: 2,
            concurrency: 1,
            temperature: None,
            max_tokens: None,
            force: false,
            no_scenarios: false,
        }
    }

    async fn setup(text: &str) -> anyhow::Result<(tempfile::TempDir, DataLayout, String)> {
        let temp = tempfile::tempdir()?;
        let layout = DataLayout::new(temp.path());
        let work_id = WorkStore::new(layout.clone())
            .create(&WorkMetadata::new("Obra Teste")?)
            .await?;
        std::fs::write(layout.chapters_dir(&work_id).join("001.txt"), text)?;
        Ok((temp, layout, work_id))
    }

    #[tokio::test]
    async fn processes_writes_and_records_chapter() -> anyhow::Result<()> {
        let (_temp, layout, work_id) = setup("第一行\n\n第二行\n第三行\n").await?;
        let client = Arc::new(EchoClient::default());

        let outcome = process_chapter(&layout, client.clone(), &args(&work_id, "001")).await?;
        let ChapterOutcome::Processed {
            chapter_id,
            segments,
            scenarios,
            characters,
            output,
        } = outcome
        else {
            panic!("expected processed outcome");
        };
        assert_eq!(chapter_id, "001");
        assert_eq!((segments, scenarios, characters), (3, 1, 1));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3, "two blocks + scenarios");

        let chapter = Chapter::from_value(serde_json::from_slice(&std::fs::read(&output)?)?)?;
        assert_eq!(chapter.lines.len(), 3);
        assert_eq!(chapter.lines[1].line_number, 2);
        assert_eq!(chapter.lines[1].translated_text.as_deref(), Some("pt: 第二行"));
        assert_eq!(chapter.scenarios[0].location.as_deref(), Some("Sala"));

        let manifest: Manifest = serde_json::from_slice(&std::fs::read(
            layout.manifest_path(&work_id),
        )?)?;
        assert_eq!(manifest.chapters["001"].segments, 3);

        let cache = LocalFsBlockCache::new(layout.clone());
        assert!(cache.load_block(&work_id, "001", 1).await?.is_some());
        assert!(layout.characters_output_path(&work_id, "001").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn unchanged_chapter_is_skipped_unless_forced() -> anyhow::Result<()> {
        let (_temp, layout, work_id) = setup("a\nb\n").await?;
        let client = Arc::new(EchoClient::default());

        process_chapter(&layout, client.clone(), &args(&work_id, "001")).await?;
        let calls = client.calls.load(Ordering::SeqCst);

        let outcome = process_chapter(&layout, client.clone(), &args(&work_id, "001")).await?;
        assert_eq!(
            outcome,
            ChapterOutcome::UpToDate {
                chapter_id: "001".to_owned()
            }
        );
        assert_eq!(client.calls.load(Ordering::SeqCst), calls);

        let mut forced = args(&work_id, "001");
        forced.force = true;
        forced.no_scenarios = true;
        process_chapter(&layout, client.clone(), &forced).await?;
        assert_eq!(
            client.calls.load(Ordering::SeqCst),
            calls,
            "forced rerun reads every block from the cache"
        );
        Ok(())
    }

    fn read_chapter(layout: &DataLayout, work_id: &str) -> anyhow::Result<Chapter> {
        let path = layout.chapter_output_path(work_id, "001");
        Ok(Chapter::from_value(serde_json::from_slice(&std::fs::read(path)?)?)?)
    }

    #[tokio::test]
    async fn edited_chapter_is_reprocessed_without_stale_blocks() -> anyhow::Result<()> {
        let (_temp, layout, work_id) = setup("alpha
beta
").await?;
        let client = Arc::new(EchoClient::default());
        let mut run = args(&work_id, "001");
        run.no_scenarios = true;

        process_chapter(&layout, client.clone(), &run).await?;
        std::fs::write(layout.chapters_dir(&work_id).join("001.txt"), "gamma
delta
")?;
        let outcome = process_chapter(&layout, client.clone(), &run).await?;
        assert!(matches!(outcome, ChapterOutcome::Processed { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);

        let chapter = read_chapter(&layout, &work_id)?;
        for line in &chapter.lines {
            let expected = format!("pt: {}", line.original_text);
            assert_eq!(line.translated_text.as_deref(), Some(expected.as_str()));
            assert_eq!(line.segments[0].text, line.original_text);
        }
        Ok(())
    }

    #[tokio::test]
    async fn forced_rerun_with_new_chunk_size_keeps_one_segment_per_line() -> anyhow::Result<()> {
        let (_temp, layout, work_id) = setup("a
b
c
d
").await?;
        let client = Arc::new(EchoClient::default());
        let mut run = args(&work_id, "001");
        run.no_scenarios = true;
        process_chapter(&layout, client.clone(), &run).await?;
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);

        run.force = true;
        run.chunk_size = 1;
        let outcome = process_chapter(&layout, client.clone(), &run).await?;
        let ChapterOutcome::Processed { segments, .. } = outcome else {
            panic!("expected processed outcome");
        };
        assert_eq!(segments, 4);
        assert_eq!(client.calls.load(Ordering::SeqCst), 6);

        let chapter = read_chapter(&layout, &work_id)?;
        let per_line = chapter
            .lines
            .iter()
            .map(|line| line.segments.len())
            .collect::<Vec<_>>();
        assert_eq!(per_line, vec![1, 1, 1, 1]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_work_or_chapter_is_an_error() -> anyhow::Result<()> {
        let (_temp, layout, work_id) = setup("a\n").await?;
        let client: Arc<dyn LlmClient> = Arc::new(EchoClient::default());

        let err = process_chapter(&layout, client.clone(), &args("nope", "001"))
            .await
            .expect_err("missing work");
        assert!(format!("{err:#}").contains("work not found"));

        let err = process_chapter(&layout, client.clone(), &args("../obra_teste", "001"))
            .await
            .expect_err("invalid work id");
        assert!(format!("{err:#}").contains("invalid work id"));

        let err = process_chapter(&layout, client, &args(&work_id, "999"))
            .await
            .expect_err("missing chapter");
        assert!(format!("{err:#}").contains("chapter not found"));
        Ok(())
    }

    #[test]
    fn tags_are_trimmed() {
        assert_eq!(
            clean_tags(vec![" xianxia".to_owned(), "".to_owned(), "sistema ".to_owned()]),
            vec!["xianxia", "sistema"]
        );
    }
}
