//! page-gen - Generate captions, images and videos with Google AI
//!
//! Captions are recorded in the local post history so page-post can publish
//! them later with `--entry`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use libpagecast::logging::LoggingConfig;
use libpagecast::service::events::EventReceiver;
use libpagecast::service::generation::{AspectRatio, CaptionRequest};
use libpagecast::{translate, PagecastError, PagecastService, UploadedMedia};
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "page-gen")]
#[command(version)]
#[command(about = "Generate post captions, images and videos with Google AI")]
#[command(long_about = "\
page-gen - Generate post captions, images and videos with Google AI

DESCRIPTION:
    page-gen writes Facebook captions from product details and media, creates
    marketing images and short videos, and runs a chat assistant. A Google AI
    API key must be verified once with `page-gen verify-key`; it is then
    remembered in the local store.

COMMANDS:
    verify-key  Check a Google AI API key and remember it
    forget-key  Remove the remembered API key
    caption     Write a caption and record it in the history
    image       Generate a marketing photo
    video       Generate a short video, optionally from a seed image
    chat        Talk to the posting assistant

USAGE EXAMPLES:
    # Remember an API key
    page-gen verify-key AIza...

    # Caption from a product sheet row and a photo
    page-gen caption --data row.txt --media photo.jpg

    # Use a saved template and extra instructions
    cat row.txt | page-gen caption --data - --media a.jpg --media b.jpg \\
        --template Humorous --prompt \"Mention the weekend sale\"

    # Generate an image
    page-gen image --prompt \"sourdough loaf on a wooden board\" --out loaf.png

    # Generate a portrait video from a photo
    page-gen video --prompt \"steam rising from fresh bread\" \\
        --seed-image loaf.png --aspect 9:16 --out loaf.mp4

CONFIGURATION:
    Configuration file: ~/.config/pagecast/config.toml

    Override with environment variables:
        PAGECAST_CONFIG          - Path to config file
        PAGECAST_GEMINI_API_KEY  - Google AI API key
        PAGECAST_LOG_LEVEL       - Log level (error, warn, info, debug)

EXIT CODES:
    0 - Success
    1 - Generation failed
    2 - API key invalid or lacking access
    3 - Invalid input (missing data, unsupported media, no key, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a Google AI API key and remember it
    VerifyKey {
        /// API key, or "-" to read it from stdin
        key: String,
    },

    /// Remove the remembered API key
    ForgetKey,

    /// Write a caption and record it in the history
    Caption {
        /// File with the product details, or "-" for stdin
        #[arg(short, long, value_name = "FILE")]
        data: String,

        /// Image or video the caption is for; repeat for a carousel
        #[arg(short, long = "media", value_name = "FILE", required = true)]
        media: Vec<PathBuf>,

        /// Saved template to apply
        #[arg(short, long)]
        template: Option<String>,

        /// Extra instructions
        #[arg(short, long)]
        prompt: Option<String>,

        /// Sampling temperature (0.0 - 2.0)
        #[arg(long)]
        temperature: Option<f32>,

        /// Upper bound on the caption length in tokens
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Generate a marketing photo
    Image {
        /// What the photo shows
        #[arg(short, long)]
        prompt: String,

        /// Where to write the image
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Generate a short video
    Video {
        /// What the video shows
        #[arg(short, long)]
        prompt: String,

        /// Image to start the video from
        #[arg(short, long, value_name = "FILE")]
        seed_image: Option<PathBuf>,

        /// Aspect ratio: 16:9 or 9:16
        #[arg(short, long, default_value = "16:9")]
        aspect: String,

        /// Where to write the video
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Talk to the posting assistant (reads lines from stdin)
    Chat,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        let (message, code) = match e.downcast_ref::<PagecastError>() {
            Some(err) => (translate(err), err.exit_code()),
            None => (format!("{:#}", e), 1),
        };
        eprintln!("Error: {}", message);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let service = PagecastService::new().await?;

    match cli.command {
        Commands::VerifyKey { key } => cmd_verify_key(&service, &key).await,
        Commands::ForgetKey => cmd_forget_key(&service).await,
        Commands::Caption {
            data,
            media,
            template,
            prompt,
            temperature,
            max_tokens,
            format,
        } => {
            cmd_caption(
                &service,
                CaptionArgs {
                    data,
                    media,
                    template,
                    prompt,
                    temperature,
                    max_tokens,
                    format,
                },
            )
            .await
        }
        Commands::Image { prompt, out } => cmd_image(&service, &prompt, &out).await,
        Commands::Video {
            prompt,
            seed_image,
            aspect,
            out,
        } => cmd_video(&service, &prompt, seed_image.as_deref(), &aspect, &out).await,
        Commands::Chat => cmd_chat(&service).await,
    }
}

/// Check and remember an API key
async fn cmd_verify_key(service: &PagecastService, key: &str) -> anyhow::Result<()> {
    let key = if key == "-" { read_stdin()? } else { key.trim().to_string() };
    service.verify_gemini_key(SecretString::from(key)).await?;
    eprintln!("API key verified and saved");
    Ok(())
}

async fn cmd_forget_key(service: &PagecastService) -> anyhow::Result<()> {
    if service.preferences().clear_api_key().await? {
        eprintln!("Saved API key removed");
    } else {
        eprintln!("No API key was saved");
    }
    Ok(())
}

struct CaptionArgs {
    data: String,
    media: Vec<PathBuf>,
    template: Option<String>,
    prompt: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    format: String,
}

/// Write a caption and record it as a Generated entry
async fn cmd_caption(service: &PagecastService, args: CaptionArgs) -> anyhow::Result<()> {
    if args.format != "text" && args.format != "json" {
        return Err(PagecastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            args.format
        ))
        .into());
    }
    if let Some(temperature) = args.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(PagecastError::InvalidInput(
                "Temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }
    }

    // The caption is saved against the page, so check it before paying for a generation
    service.config().page_id()?;

    let sheet_data = if args.data == "-" {
        read_stdin()?
    } else {
        read_input_file(Path::new(&args.data))?
    };
    let media = args
        .media
        .iter()
        .map(|path| UploadedMedia::from_file(path))
        .collect::<libpagecast::Result<Vec<_>>>()?;

    let template = match &args.template {
        Some(name) => Some(service.templates().find(name).await?.ok_or_else(|| {
            PagecastError::InvalidInput(format!("No template named '{}'", name))
        })?),
        None => None,
    };
    let instructions = [template.map(|t| t.value), args.prompt]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n");

    let gemini = service.gemini().await?;
    let generation = service.generation(Arc::new(gemini));
    let caption = generation
        .caption(&CaptionRequest {
            sheet_data,
            media: media.clone(),
            instructions: (!instructions.trim().is_empty()).then_some(instructions),
            temperature: args.temperature,
            max_tokens: args.max_tokens,
        })
        .await?;

    let entry = service.record_generated(&caption, &media).await?;
    debug!("Recorded caption as {}", entry.id);

    if args.format == "json" {
        let rendered = serde_json::to_string_pretty(&entry).context("Could not render JSON")?;
        println!("{}", rendered);
    } else {
        println!("{}", caption);
        eprintln!("Saved as {} (publish with: page-post --entry {})", entry.id, entry.id);
    }
    Ok(())
}

/// Generate a photo and write it to disk
async fn cmd_image(service: &PagecastService, prompt: &str, out: &Path) -> anyhow::Result<()> {
    let gemini = service.gemini().await?;
    let generation = service.generation(Arc::new(gemini));

    let image = generation.image(prompt).await?;
    write_media(&image, out)?;
    eprintln!("Wrote {} ({})", out.display(), image.mime_type);
    Ok(())
}

/// Generate a video and write it to disk
async fn cmd_video(
    service: &PagecastService,
    prompt: &str,
    seed_image: Option<&Path>,
    aspect: &str,
    out: &Path,
) -> anyhow::Result<()> {
    let aspect: AspectRatio = aspect.parse()?;
    let seed = seed_image.map(UploadedMedia::from_file).transpose()?;

    let gemini = service.gemini().await?;
    let generation = service.generation(Arc::new(gemini));

    let progress = spawn_progress(service.subscribe());
    let result = generation.video(prompt, aspect, seed.as_ref()).await;
    progress.abort();

    let video = result?;
    write_media(&video, out)?;
    eprintln!("Wrote {}", out.display());
    Ok(())
}

/// Interactive chat on stdin until EOF or /quit
async fn cmd_chat(service: &PagecastService) -> anyhow::Result<()> {
    let gemini = service.gemini().await?;
    let mut session = service.chat(Arc::new(gemini));

    println!("{}", session.greeting());
    eprintln!("(type /clear to start over, /quit to leave)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear();
                println!("{}", session.greeting());
                continue;
            }
            _ => {}
        }

        match session.send(message).await {
            Ok(reply) => println!("{}", reply),
            // A failed turn is dropped; the session stays usable
            Err(e) => eprintln!("Error: {}", translate(&e)),
        }
    }
    Ok(())
}

fn read_stdin() -> libpagecast::Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| PagecastError::InvalidInput(format!("Failed to read from stdin: {}", e)))?;
    Ok(buffer.trim().to_string())
}

fn read_input_file(path: &Path) -> libpagecast::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| PagecastError::InvalidInput(format!("Could not read {}: {}", path.display(), e)))
}

fn write_media(media: &UploadedMedia, out: &Path) -> anyhow::Result<()> {
    let bytes = media.bytes()?;
    std::fs::write(out, bytes).with_context(|| format!("Could not write {}", out.display()))
}

/// Print generation progress to stderr
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
