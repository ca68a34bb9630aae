// Command-line driver for the rendering engine.
//
// Runs a single extract / pdf / shot job against a local Chrome and prints
// JSON or writes the rendered file. Ctrl-C cancels the job in flight.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kodegen_tools_render::{
    CancelReason, CancellationToken, EngineConfig, ExtractOptions, PaperFormat, PdfOptions,
    RenderEngine, RenderedDocument, Representation, ScreenshotOptions,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kodegen-render")]
#[command(version, about = "Render web pages in headless Chrome and extract their content")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Run with a visible browser window")]
    headful: bool,

    #[arg(long, global = true, value_name = "MS", help = "Navigation budget in milliseconds")]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the main content of a page as JSON
    Extract {
        url: String,

        #[arg(long, default_value = "markdown", help = "markdown, text or html")]
        format: Representation,

        #[arg(long, help = "Embed a viewport screenshot in the result")]
        screenshot: bool,

        #[arg(long, value_name = "CSS", help = "Wait for this selector after load")]
        wait_for: Option<String>,

        #[arg(long, value_name = "CSS", help = "Stylesheet injected after load")]
        inject_css: Option<String>,

        #[arg(long, help = "Scroll through the page to trigger lazy loading")]
        scroll: bool,

        #[arg(long, help = "Fail instead of returning partial content on timeout")]
        strict: bool,

        #[arg(long, help = "Include the rendered HTML in the output")]
        raw_html: bool,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },
    /// Render a page to PDF
    Pdf {
        url: String,

        #[arg(long, default_value = "a4", help = "a4, a3, letter or legal")]
        paper: PaperFormat,

        #[arg(long)]
        landscape: bool,

        #[arg(long, help = "Skip CSS backgrounds")]
        no_background: bool,

        #[arg(long, short, help = "Output path (generated name in the current directory if omitted)")]
        output: Option<PathBuf>,
    },
    /// Capture a PNG screenshot of a page
    Shot {
        url: String,

        #[arg(long, default_value_t = 1280)]
        width: u32,

        #[arg(long, default_value_t = 720)]
        height: u32,

        #[arg(long, help = "Capture the full scrollable page")]
        full_page: bool,

        #[arg(long, short, help = "Output path (generated name in the current directory if omitted)")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut builder = EngineConfig::builder()
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid environment configuration")?;
    if cli.headful {
        builder = builder.headless(false);
    }
    let config = builder.build().context("Invalid engine configuration")?;
    let engine = RenderEngine::new(config);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling job");
            ctrl_c.fire(CancelReason::ClientDisconnected);
        }
    });

    let render_timeout = cli.timeout_ms.map(Duration::from_millis);
    let outcome = run(&engine, cli.command, render_timeout, cancel).await;

    if let Err(e) = engine.shutdown().await {
        warn!("Browser shutdown failed: {e}");
    }
    outcome
}

async fn run(
    engine: &RenderEngine,
    command: Commands,
    render_timeout: Option<Duration>,
    cancel: CancellationToken,
) -> Result<()> {
    match command {
        Commands::Extract {
            url,
            format,
            screenshot,
            wait_for,
            inject_css,
            scroll,
            strict,
            raw_html,
            output,
        } => {
            let options = ExtractOptions {
                render_timeout,
                allow_screenshot: screenshot,
                style_injection: inject_css,
                wait_for_selector: wait_for,
                scroll_to_bottom: scroll,
                fail_on_navigation_timeout: strict,
                include_raw_html: raw_html,
                cancel: Some(cancel),
            };
            let result = engine.extract(&url, format, options).await?;
            let json = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => write_file(&path, json.as_bytes()).await?,
                None => println!("{json}"),
            }
        }
        Commands::Pdf {
            url,
            paper,
            landscape,
            no_background,
            output,
        } => {
            let options = PdfOptions {
                paper,
                landscape,
                print_background: !no_background,
                render_timeout,
                cancel: Some(cancel),
                ..PdfOptions::default()
            };
            let document = engine.render_pdf(&url, options).await?;
            save_document(&document, output).await?;
        }
        Commands::Shot {
            url,
            width,
            height,
            full_page,
            output,
        } => {
            let options = ScreenshotOptions {
                width,
                height,
                full_page,
                render_timeout,
                cancel: Some(cancel),
                ..ScreenshotOptions::default()
            };
            let document = engine.capture_screenshot(&url, options).await?;
            save_document(&document, output).await?;
        }
    }
    Ok(())
}

async fn save_document(document: &RenderedDocument, output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from(&document.filename));
    write_file(&path, &document.bytes).await?;
    info!(path = %path.display(), bytes = document.bytes.len(), mime = %document.mime_type, "Saved");
    Ok(())
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
