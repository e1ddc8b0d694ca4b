use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use finrecord_core::generator::build_generator;
use finrecord_core::pipeline::extract_document_text;
use finrecord_core::prompt::truncate_chars;
use finrecord_core::{PdfBackend, ProgressEvent, ResultTable, build_prompt, export, run_pipeline};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

mod output;
mod settings;

use output::ColorMode;
use settings::RunArgs;

/// Financial Report Extractor - Pull key figures out of PDF financial reports
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Verbose logging (equivalent to RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract financial fields from each document and write them as JSON
    Run(RunArgs),

    /// Print the table for a previously written result file
    Show {
        /// Path to the result JSON file
        path: PathBuf,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => {
            if args.dry_run {
                dry_run(args).await
            } else {
                run(args).await
            }
        }
        Command::Show { path, no_color } => show(path, no_color),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let file = settings::load_file_config(args.config.as_deref())?;
    let settings = settings::resolve(&args, file, |k| std::env::var(k).ok())?;
    let color = ColorMode(!args.no_color);

    for doc in &settings.documents {
        if !doc.path.exists() {
            tracing::warn!(label = %doc.label, path = %doc.path.display(), "document not found");
        }
    }

    let generator = build_generator(&settings.generator)?;
    let backend: Arc<dyn PdfBackend> = Arc::new(settings.pdf_backend());

    let mut writer = std::io::stdout();
    writeln!(
        writer,
        "Processing {} documents with {}...\n",
        settings.documents.len(),
        generator.name()
    )?;

    // Progress lines go to stdout; the spinner draws on stderr between them.
    let spinner: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
    let progress_cb = {
        let spinner = Arc::clone(&spinner);
        move |event: ProgressEvent| {
            let Ok(mut slot) = spinner.lock() else {
                return;
            };
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
            if let ProgressEvent::Generating { label, .. } = &event {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar.set_message(format!("Querying model for {}", label));
                bar.enable_steady_tick(Duration::from_millis(120));
                *slot = Some(bar);
            }
            let mut out = std::io::stdout();
            let _ = output::print_progress(&mut out, &event, color);
            let _ = out.flush();
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing with remaining documents marked cancelled");
            cancel_clone.cancel();
        }
    });

    let (results, table) = run_pipeline(
        &settings.documents,
        backend,
        generator.as_ref(),
        &settings.config,
        progress_cb,
        &cancel,
    )
    .await?;

    if let Ok(mut slot) = spinner.lock()
        && let Some(bar) = slot.take()
    {
        bar.finish_and_clear();
    }

    writeln!(writer)?;
    output::print_table(&mut writer, &table, color)?;
    let written = (!cancel.is_cancelled()).then_some(settings.config.output_path.as_path());
    output::print_summary(&mut writer, &results, written, color)?;
    if cancel.is_cancelled() {
        writeln!(writer, "Run cancelled; output file not written.")?;
    }

    Ok(())
}

async fn dry_run(args: RunArgs) -> anyhow::Result<()> {
    let file = settings::load_file_config(args.config.as_deref())?;
    let settings = settings::resolve(&args, file, |k| std::env::var(k).ok())?;
    let color = ColorMode(!args.no_color);
    let backend: Arc<dyn PdfBackend> = Arc::new(settings.pdf_backend());

    let mut writer = std::io::stdout();
    writeln!(
        writer,
        "DRY RUN: {} documents (model not called)\n",
        settings.documents.len()
    )?;

    for doc in &settings.documents {
        let outcome = match extract_document_text(Arc::clone(&backend), &doc.path).await {
            Ok(text) => {
                let text_chars = text.chars().count();
                let kept = match settings.config.max_input_chars {
                    Some(limit) => truncate_chars(&text, limit).0,
                    None => text.as_str(),
                };
                Ok((text_chars, build_prompt(kept).chars().count()))
            }
            Err(e) => Err(e.to_string()),
        };
        output::print_dry_run_entry(&mut writer, &doc.label, &doc.path, outcome, color)?;
    }

    writeln!(
        writer,
        "Output would be written to {}",
        settings.config.output_path.display()
    )?;
    Ok(())
}

fn show(path: PathBuf, no_color: bool) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let results = export::read_results(&path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    let color = ColorMode(!no_color);

    let mut writer = std::io::stdout();
    output::print_table(&mut writer, &ResultTable::from_collection(&results), color)?;
    output::print_summary(&mut writer, &results, None, color)?;
    Ok(())
}
