//! page-post - Publish a post to a Facebook Page, optionally cross-posting to Instagram
//!
//! Reads media files from disk, publishes them with a caption and records the
//! result in the local post history.

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use libpagecast::logging::LoggingConfig;
use libpagecast::media::MediaSelection;
use libpagecast::service::events::EventReceiver;
use libpagecast::service::publish::PublishOutcome;
use libpagecast::service::scheduling::parse_schedule;
use libpagecast::{
    translate, LogEntry, PagecastError, PagecastService, Privacy, Result, Submission, Submitted,
    UploadedMedia,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "page-post")]
#[command(version)]
#[command(about = "Publish a post to a Facebook Page and optionally Instagram")]
#[command(long_about = "\
page-post - Publish a post to a Facebook Page and optionally Instagram

DESCRIPTION:
    page-post uploads one image, one video or a carousel of up to 10 images to
    the configured Facebook Page. With --instagram the same media is also
    published to the connected Instagram business account. Every post is
    recorded in the local history (see page-history).

USAGE EXAMPLES:
    # Post a photo
    page-post --media photo.jpg --caption \"Fresh bread today\"

    # Carousel cross-posted to Instagram
    page-post --media a.jpg --media b.jpg --caption \"New menu\" --instagram

    # Publish a caption generated earlier with page-gen
    page-post --media photo.jpg --entry post_1718000000000_ab12cd34

    # Schedule for later (Facebook schedules natively)
    page-post --media photo.jpg --caption \"Opening soon\" --at \"tomorrow 9am\"

    # Caption from stdin, JSON output
    echo \"Weekend hours\" | page-post --media photo.jpg --caption - --format json

SCHEDULING:
    --at accepts RFC 3339, \"YYYY-MM-DD HH:MM\" (local), a duration such as
    \"2h\" or natural language such as \"tomorrow 3pm\". A scheduled post that
    also goes to Instagram is held by this process until the time arrives;
    press Ctrl-C to cancel it.

CONFIGURATION:
    Configuration file: ~/.config/pagecast/config.toml

    Override with environment variables:
        PAGECAST_CONFIG         - Path to config file
        PAGECAST_FB_USER_TOKEN  - Facebook user access token
        PAGECAST_LOG_LEVEL      - Log level (error, warn, info, debug)
        PAGECAST_LOG_FORMAT     - Log format (text, json, pretty)

EXIT CODES:
    0 - Success
    1 - Publishing failed
    2 - Access token expired, invalid or missing a permission
    3 - Invalid input (missing caption, bad schedule, unsupported media, etc.)
")]
struct Cli {
    /// Media file to publish; repeat for a carousel (images only)
    #[arg(short, long = "media", value_name = "FILE", required = true)]
    media: Vec<PathBuf>,

    /// Caption text, or "-" to read it from stdin; overrides the entry caption
    #[arg(short, long)]
    caption: Option<String>,

    /// History entry whose caption to publish
    #[arg(short, long, value_name = "ID")]
    entry: Option<String>,

    /// Publish at a later time (e.g. "2h", "tomorrow 3pm", RFC 3339)
    #[arg(long, value_name = "TIME")]
    at: Option<String>,

    /// Create the Facebook post without showing it on the page feed
    #[arg(long)]
    unpublished: bool,

    /// Also publish to the connected Instagram account
    #[arg(short, long)]
    instagram: bool,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", translate(&e));
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.format != "text" && cli.format != "json" {
        return Err(PagecastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            cli.format
        )));
    }

    let media = load_media(&cli.media)?;
    let caption = match cli.caption.as_deref() {
        Some("-") => Some(read_stdin()?),
        other => other.map(str::to_string),
    };
    let scheduled_at = cli.at.as_deref().map(parse_schedule).transpose()?;

    let service = PagecastService::new().await?;
    let progress = (cli.format == "text").then(|| spawn_progress(service.subscribe()));

    let submission = Submission {
        caption,
        media,
        entry_id: cli.entry,
        privacy: if cli.unpublished {
            Privacy::Unpublished
        } else {
            Privacy::Published
        },
        scheduled_at,
        cross_post_instagram: cli.instagram || service.config().instagram.enabled,
    };

    let result = submit(&service, submission, &cli.format).await;
    if let Some(progress) = progress {
        progress.abort();
    }
    result
}

async fn submit(service: &PagecastService, submission: Submission, format: &str) -> Result<()> {
    match service.submit(submission).await? {
        Submitted::Published { entry, outcome } => report(&entry, &outcome, format),
        Submitted::Deferred { entry, pending } => {
            eprintln!(
                "Waiting until {} to publish {} (Ctrl-C cancels)",
                pending.at().with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
                entry.id
            );

            let canceller = pending.canceller();
            let wait = pending.wait();
            tokio::pin!(wait);

            let result = tokio::select! {
                result = &mut wait => result,
                _ = tokio::signal::ctrl_c() => {
                    debug!("Interrupt received, cancelling {}", entry.id);
                    canceller.cancel();
                    wait.await
                }
            };

            match result? {
                Some(outcome) => {
                    let entry = service.history().require(&entry.id).await?;
                    report(&entry, &outcome, format)
                }
                None => {
                    eprintln!("Scheduled publish of {} cancelled", entry.id);
                    std::process::exit(130);
                }
            }
        }
    }
}

/// Entry id on stdout, summary on stderr (or everything as JSON)
fn report(entry: &LogEntry, outcome: &PublishOutcome, format: &str) -> Result<()> {
    if format == "json" {
        return print_json(&serde_json::json!({
            "entry": entry,
            "outcome": outcome,
            "summary": outcome.summary(),
        }));
    }
    println!("{}", entry.id);
    eprintln!("{}", outcome.summary());
    Ok(())
}

/// Read media files; more than one file makes a carousel
fn load_media(paths: &[PathBuf]) -> Result<Vec<UploadedMedia>> {
    let mut selection = if paths.len() > 1 {
        MediaSelection::carousel()
    } else {
        MediaSelection::single()
    };
    for path in paths {
        selection.add(UploadedMedia::from_file(path)?)?;
    }
    Ok(selection.into_items())
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| PagecastError::InvalidInput(format!("Failed to read from stdin: {}", e)))?;
    Ok(buffer.trim().to_string())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| PagecastError::InvalidInput(format!("Could not render JSON: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

/// Print service events to stderr while the command runs
fn spawn_progress(mut events: EventReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => eprintln!("{}", event.describe()),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}
