use std::process::ExitCode;

use anyhow::Context as _;
use chapterforge::cli::{ChapterCommand, Cli, Command, CostCommand, WorkCommand};
use chapterforge::config::DataLayout;
use chapterforge::pipeline;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    // A missing .env is fine; a malformed one is not.
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        return Err(err).context("load .env");
    }
    chapterforge::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");
    let layout = DataLayout::new(cli.data_dir);

    match cli.command {
        Command::Work {
            command: WorkCommand::Create(args),
        } => {
            pipeline::work_create(&layout, args)
                .await
                .context("work create")?;
        }
        Command::Work {
            command: WorkCommand::List,
        } => {
            pipeline::work_list(&layout).await.context("work list")?;
        }
        Command::Work {
            command: WorkCommand::Update(args),
        } => {
            pipeline::work_update(&layout, args)
                .await
                .context("work update")?;
        }
        Command::Work {
            command: WorkCommand::Chapters(args),
        } => {
            pipeline::work_chapters(&layout, args)
                .await
                .context("work chapters")?;
        }
        Command::Work {
            command: WorkCommand::Delete(args),
        } => {
            pipeline::work_delete(&layout, args)
                .await
                .context("work delete")?;
        }
        Command::Chapter {
            command: ChapterCommand::Process(args),
        } => {
            pipeline::chapter_process(&layout, args)
                .await
                .context("chapter process")?;
        }
        Command::Cost {
            command: CostCommand::Calc(args),
        } => {
            pipeline::cost_calc(args).await.context("cost calc")?;
        }
        Command::Cost {
            command: CostCommand::File(args),
        } => {
            pipeline::cost_file(args).await.context("cost file")?;
        }
    }

    Ok(())
}
