use anyhow::Context as _;

/// `CHAPTERFORGE_LOG_FORMAT` value selecting one JSON object per event.
const JSON_FORMAT: &str = "json";

pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("build log filter")?;

    let json = std::env::var("CHAPTERFORGE_LOG_FORMAT")
        .is_ok_and(|format| format.trim().eq_ignore_ascii_case(JSON_FORMAT));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
