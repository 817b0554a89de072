//! page-history - Browse and manage the local post history
//!
//! Unix-style tool for the history log, caption templates and the Facebook
//! connection check.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libpagecast::logging::LoggingConfig;
use libpagecast::{
    translate, ApiError, LogEntry, PagecastError, PagecastService, PromptTemplate, Result, Theme,
};

#[derive(Parser, Debug)]
#[command(name = "page-history")]
#[command(version)]
#[command(about = "Browse and manage the local post history")]
#[command(long_about = "\
page-history - Browse and manage the local post history

DESCRIPTION:
    page-history shows the posts composed with page-gen and page-post (newest
    first, at most 50 are kept), publishes unpublished posts, manages caption
    templates and checks the Facebook and Instagram connection.

COMMANDS:
    list         List history entries
    publish-now  Make an unpublished post visible on the page feed
    templates    List, add, remove or reset caption templates
    connect      Check the Facebook Page and linked Instagram account
    theme        Show or change the saved theme

USAGE EXAMPLES:
    # Show the last 10 entries
    page-history list --limit 10

    # Entries that are still waiting (generated or scheduled)
    page-history list --pending

    # JSON output for scripting
    page-history list --format json | jq '.[] | .caption'

    # Publish an unpublished post
    page-history publish-now post_1718000000000_ab12cd34

    # Add a caption template
    page-history templates add \"Rainy day\" \"Mention the weather and hot drinks\"

    # Check the Facebook connection
    page-history connect

CONFIGURATION:
    Configuration file: ~/.config/pagecast/config.toml
    Database location: ~/.local/share/pagecast/pagecast.db

    Override with environment variables:
        PAGECAST_CONFIG         - Path to config file
        PAGECAST_FB_USER_TOKEN  - Facebook user access token

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Access token expired, invalid or missing a permission
    3 - Invalid input (unknown entry, bad template, etc.)
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
    /// List history entries, newest first
    List {
        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only entries still waiting (generated or scheduled)
        #[arg(long)]
        pending: bool,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Make an unpublished post visible on the page feed
    PublishNow {
        /// History entry ID
        entry_id: String,
    },

    /// Manage caption templates
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Check the Facebook Page and linked Instagram account
    Connect,

    /// Show the saved theme, or set it (light, dark, toggle)
    Theme {
        /// New theme
        value: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateAction {
    /// List templates
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Add a template, replacing one with the same name
    Add {
        /// Template name
        name: String,

        /// Instructions passed to the caption generator
        instructions: String,
    },

    /// Remove a template by name
    Remove {
        /// Template name
        name: String,
    },

    /// Restore the built-in templates
    Reset,
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
    let service = PagecastService::new().await?;

    match cli.command {
        Commands::List {
            limit,
            pending,
            format,
        } => {
            cmd_list(&service, limit, pending, &format).await?;
        }
        Commands::PublishNow { entry_id } => {
            cmd_publish_now(&service, &entry_id).await?;
        }
        Commands::Templates { action } => {
            cmd_templates(&service, action).await?;
        }
        Commands::Connect => {
            cmd_connect(&service).await?;
        }
        Commands::Theme { value } => {
            cmd_theme(&service, value.as_deref()).await?;
        }
    }

    Ok(())
}

fn check_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(PagecastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| PagecastError::InvalidInput(format!("Could not render JSON: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

/// List history entries
async fn cmd_list(
    service: &PagecastService,
    limit: Option<usize>,
    pending: bool,
    format: &str,
) -> Result<()> {
    check_format(format)?;

    let mut entries = service.history().list(None).await;
    if pending {
        entries.retain(|e| !e.status.is_terminal());
    }
    if let Some(limit) = limit {
        entries.truncate(limit);
    }

    if format == "json" {
        print_json(&entries)
    } else {
        output_list_text(&entries);
        Ok(())
    }
}

/// Output entries as human-readable text
fn output_list_text(entries: &[LogEntry]) {
    let now = Utc::now();

    for entry in entries {
        let status = match (entry.scheduled_at, entry.privacy) {
            (Some(at), _) if entry.status == libpagecast::LogStatus::Scheduled => {
                format!("{} {}", entry.status, format_time_until(now, at))
            }
            (_, Some(privacy)) => format!("{} ({})", entry.status, privacy),
            _ => entry.status.to_string(),
        };

        println!(
            "{} | {} | {} | {} | {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.media_kind,
            status,
            truncate_content(&entry.caption, 50)
        );
    }
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= max_len {
        flat
    } else {
        let cut: String = flat.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: DateTime<Utc>, scheduled_at: DateTime<Utc>) -> String {
    let diff = (scheduled_at - now).num_seconds();

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

/// Publish an unpublished post
async fn cmd_publish_now(service: &PagecastService, entry_id: &str) -> Result<()> {
    let entry = service.publish_now(entry_id).await?;
    println!("{}", entry.id);
    eprintln!("Post {} is now visible on the page feed", entry.id);
    Ok(())
}

/// Manage caption templates
async fn cmd_templates(service: &PagecastService, action: TemplateAction) -> Result<()> {
    let templates = service.templates();

    match action {
        TemplateAction::List { format } => {
            check_format(&format)?;
            let list = templates.list().await?;
            if format == "json" {
                print_json(&list)?;
            } else {
                for template in &list {
                    println!("{} | {}", template.name, truncate_content(&template.value, 60));
                }
            }
        }
        TemplateAction::Add { name, instructions } => {
            templates
                .save(PromptTemplate::new(name.clone(), instructions))
                .await?;
            eprintln!("Saved template '{}'", name.trim());
        }
        TemplateAction::Remove { name } => {
            if !templates.delete(&name).await? {
                return Err(PagecastError::InvalidInput(format!(
                    "No template named '{}'",
                    name
                )));
            }
            eprintln!("Removed template '{}'", name);
        }
        TemplateAction::Reset => {
            let restored = templates.reset().await?;
            eprintln!("Restored {} built-in templates", restored.len());
        }
    }

    Ok(())
}

/// Check the page and the linked Instagram account
async fn cmd_connect(service: &PagecastService) -> Result<()> {
    let config = service.config();
    let page_id = config.page_id()?;
    let token = config.require_user_token()?;

    let name = service.connection().verify_page(&page_id, &token).await?;
    println!("Facebook Page: {} ({})", name, page_id);

    match service.connection().verify_instagram(&page_id, &token).await {
        Ok(account) => match account.username {
            Some(username) => println!("Instagram: @{} ({})", username, account.id),
            None => println!("Instagram: {}", account.id),
        },
        Err(PagecastError::Api(ApiError::NotFound { .. })) => {
            eprintln!("No Instagram business account is linked to this page");
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

/// Show or change the theme
async fn cmd_theme(service: &PagecastService, value: Option<&str>) -> Result<()> {
    let prefs = service.preferences();
    let theme = match value {
        None => prefs.theme().await?,
        Some("toggle") => prefs.toggle_theme().await?,
        Some(other) => {
            let theme: Theme = other.parse()?;
            prefs.set_theme(theme).await?;
            theme
        }
    };
    println!("{}", theme_name(theme));
    Ok(())
}

fn theme_name(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "light",
        Theme::Dark => "dark",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content_counts_chars() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("ééééé", 3), "ééé...");
        assert_eq!(truncate_content("two\nlines", 20), "two lines");
    }

    #[test]
    fn test_format_time_until() {
        let now = Utc::now();
        assert_eq!(format_time_until(now, now - chrono::Duration::minutes(1)), "overdue");
        assert_eq!(format_time_until(now, now + chrono::Duration::seconds(30)), "in <1 minute");
        assert_eq!(format_time_until(now, now + chrono::Duration::minutes(90)), "in 1 hour");
        assert_eq!(format_time_until(now, now + chrono::Duration::days(3)), "in 3 days");
    }
}
