//! Honyaku CLI - resumable markdown book translator.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use honyaku::chapters::{self, ChapterCatalog};
use honyaku::config::Config;
use honyaku::console::Console;
use honyaku::pipeline::{Interrupt, Pipeline, RunOptions};
use honyaku::site;
use honyaku::state::JobState;
use honyaku::translator::Translator;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Resumable markdown book translator.
#[derive(Parser, Debug)]
#[command(name = "honyaku")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate the book page by page, then export the merged result.
    Translate(TranslateArgs),

    /// Split the translated book into mdBook chapter files.
    SplitChapters(SplitChaptersArgs),

    /// Rebuild the chapter list of the static site's index.html.
    UpdateIndex(UpdateIndexArgs),
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// Source markdown file.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Merged output file.
    #[arg(short, long, conflicts_with = "sample")]
    output: Option<PathBuf>,

    /// Job state file.
    #[arg(short, long, conflicts_with = "sample")]
    state: Option<PathBuf>,

    /// Model identifier.
    #[arg(short, long)]
    model: Option<String>,

    /// Discard saved progress and translate every page again.
    #[arg(long)]
    restart: bool,

    /// Re-read the source and register new pages before translating.
    #[arg(long)]
    no_resume: bool,

    /// Only merge and write the output.
    #[arg(long)]
    export_only: bool,

    /// Leave untranslated pages out of the output.
    #[arg(long)]
    translated_only: bool,

    /// Translate at most N pages.
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Start from page N.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    start: Option<u32>,

    /// Sample mode: translate N pages from a fresh state and preview them.
    /// Uses the sample output and state paths from the config.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    sample: Option<u64>,
}

#[derive(Args, Debug)]
struct SplitChaptersArgs {
    /// Translated markdown file.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// mdBook source directory to write.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML chapter catalog replacing the built-in one.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct UpdateIndexArgs {
    /// Directory with chapter<N>.md files.
    #[arg(long)]
    chapters: Option<PathBuf>,

    /// index.html to update.
    #[arg(long)]
    index: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let console = Console::new();

    console.section("Honyaku - Markdown Book Translator");

    console.step("Loading configuration...");
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Command::Translate(args) => translate(config, args, &console).await?,
        Command::SplitChapters(args) => split(&config, args, &console)?,
        Command::UpdateIndex(args) => update_index(&config, args, &console)?,
    }

    console.section("Done!");
    Ok(())
}

/// Install the tracing subscriber on stderr.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("honyaku={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn translate(mut config: Config, args: TranslateArgs, console: &Console) -> Result<()> {
    if let Some(model) = args.model {
        config.api.model = model;
    }
    config.validate().context("Invalid configuration")?;
    console.success("Configuration loaded");

    let input = args.input.unwrap_or_else(|| config.paths.input.clone());
    let sample = args.sample.map(|n| n as usize);

    let (output, state_path) = match sample {
        Some(_) => (
            config.paths.sample_output.clone(),
            config.paths.sample_state_file.clone(),
        ),
        None => (
            args.output.unwrap_or_else(|| config.paths.output.clone()),
            args.state.unwrap_or_else(|| config.paths.state_file.clone()),
        ),
    };

    console.info(&format!("Input: {}", input.display()));
    console.info(&format!("Output: {}", output.display()));
    console.info(&format!("State: {}", state_path.display()));
    console.info(&format!("Model: {}", config.api.model));

    let state = JobState::load(&state_path)
        .with_context(|| format!("Failed to load state file {}", state_path.display()))?;
    let translator = Translator::from_config(&config).context("Failed to create translator")?;

    let interrupt = Interrupt::new();
    spawn_ctrl_c_handler(interrupt.clone());

    let mut pipeline = Pipeline::new(&input, &output, state, translator)
        .with_page_delay(Duration::from_secs_f64(
            config.translation.delay_between_pages_sec,
        ))
        .with_interrupt(interrupt);

    if let Some(pages) = sample {
        pipeline
            .run_sample(pages, args.start)
            .await
            .context("Sample translation failed")?;
        return Ok(());
    }

    if args.export_only {
        ensure_state_exists(&pipeline, &state_path)?;
        pipeline
            .export(args.translated_only)
            .context("Failed to export translation")?;
        return Ok(());
    }

    if args.restart {
        console.warning("Discarding saved progress");
        pipeline.state_mut().reset();
    }

    let summary = pipeline
        .run(RunOptions {
            resume: !args.no_resume && !args.restart,
            limit: args.limit,
            start_page: args.start,
        })
        .await
        .context("Translation failed")?;

    let counts = pipeline.state().status_counts();
    console.info(&format!(
        "Pages: {} completed, {} failed, {} pending",
        counts.completed, counts.failed, counts.pending
    ));
    if !summary.failed.is_empty() {
        console.warning(&format!(
            "Failed pages (retried on next run): {:?}",
            summary.failed
        ));
    }

    pipeline
        .export(args.translated_only)
        .context("Failed to export translation")?;
    Ok(())
}

/// Refuse to export from a state file that does not exist yet.
fn ensure_state_exists(pipeline: &Pipeline, state_path: &Path) -> Result<()> {
    if pipeline.state().is_empty() {
        anyhow::bail!(
            "No translation state found at {}; run a translation first",
            state_path.display()
        );
    }
    Ok(())
}

/// Trigger `interrupt` when the user presses Ctrl-C.
fn spawn_ctrl_c_handler(interrupt: Interrupt) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => interrupt.trigger(),
            Err(e) => tracing::warn!("Failed to install Ctrl-C handler: {}", e),
        }
    });
}

fn split(config: &Config, args: SplitChaptersArgs, console: &Console) -> Result<()> {
    let input = args.input.unwrap_or_else(|| config.paths.output.clone());
    let src_dir = args.output.unwrap_or_else(|| config.paths.book_src.clone());

    if !input.exists() {
        anyhow::bail!(
            "{} not found; run `honyaku translate` first",
            input.display()
        );
    }

    let catalog = match &args.catalog {
        Some(path) => ChapterCatalog::load_from(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => ChapterCatalog::default(),
    };

    console.step(&format!("Reading {}", input.display()));
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    console.step("Splitting chapters...");
    let split = chapters::split_chapters(&text, &catalog).context("Failed to split chapters")?;
    console.success(&format!(
        "Found {} of {} chapters",
        split.chapters.len(),
        catalog.chapters.len()
    ));

    if !split.unmatched.is_empty() {
        console.warning(&format!(
            "Chapter headings not found: {:?}",
            split.unmatched
        ));
    }

    let written = chapters::write_book(&split, &catalog.book, &src_dir)
        .context("Failed to write chapter files")?;

    console.success(&format!("Created: {}", written.introduction.display()));
    for path in &written.chapter_files {
        console.success(&format!("Created: {}", path.display()));
    }
    console.success(&format!("Created: {}", written.summary.display()));
    console.info("Run `mdbook build` to build the book.");
    Ok(())
}

fn update_index(config: &Config, args: UpdateIndexArgs, console: &Console) -> Result<()> {
    let chapters_dir = args
        .chapters
        .unwrap_or_else(|| config.paths.chapters_dir.clone());
    let index = args.index.unwrap_or_else(|| config.paths.index_html.clone());

    console.step(&format!(
        "Updating {} from {}",
        index.display(),
        chapters_dir.display()
    ));
    let chapters =
        site::update_index_file(&chapters_dir, &index).context("Failed to update index.html")?;

    console.success(&format!("Listed {} chapters:", chapters.len()));
    for chapter in &chapters {
        console.info(&format!(
            "{}. {} {}",
            chapter.number,
            chapter.title,
            console.muted(&format!("({})", chapter.file.display()))
        ));
    }
    Ok(())
}
