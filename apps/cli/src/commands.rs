//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use storypub_core::notify::{Notice, NoticeKind, Notifier};
use storypub_core::publish::{PublishInputs, execute_publish};
use storypub_markdown::ParseOptions;
use storypub_shared::{
    AppConfig, EnvSnapshot, HostSecrets, HostSettings, PayloadExtras, init_config, load_config,
    load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// storypub: publish markdown user stories to ServiceNow.
#[derive(Parser)]
#[command(
    name = "storypub",
    version,
    about = "Publish a markdown user story to the ServiceNow rm_story table, creating or updating it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.storypub/storypub.toml.
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create or update a story from a markdown file.
    Publish {
        /// Path to the markdown file.
        file: PathBuf,

        /// Instance URL (overrides config file and SN_INSTANCE).
        #[arg(long)]
        instance: Option<String>,

        /// Do not update a story that already exists; report it instead.
        #[arg(long)]
        no_update: bool,

        /// Send plain text (disable Markdown to HTML conversion).
        #[arg(long)]
        plain: bool,

        /// Priority (e.g. 1-5).
        #[arg(long)]
        priority: Option<String>,

        /// Assigned-to user sys_id.
        #[arg(long)]
        assigned_to: Option<String>,

        /// Product sys_id.
        #[arg(long)]
        product: Option<String>,

        /// Story points.
        #[arg(long)]
        story_points: Option<String>,

        /// Additional JSON object merged into the payload, e.g. '{"u_custom":"val"}'.
        #[arg(long)]
        additional: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Parse a markdown file and print the fields that would be sent.
    Preview {
        /// Path to the markdown file.
        file: PathBuf,

        /// Show raw text instead of rendered HTML.
        #[arg(long)]
        plain: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show the values read from the config file.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "storypub=info",
        1 => "storypub=debug",
        _ => "storypub=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
///
/// The config file is read only by commands that use it, so `preview` and
/// `config init` still work when it is malformed.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config_file;

    match cli.command {
        Command::Publish {
            file,
            instance,
            no_update,
            plain,
            priority,
            assigned_to,
            product,
            story_points,
            additional,
            json,
        } => {
            let extras = PayloadExtras {
                priority,
                assigned_to,
                product,
                story_points,
                additional: parse_additional(additional.as_deref())?,
            };
            let flags = PublishFlags {
                instance,
                update_if_exists: no_update.then_some(false),
                plain,
                json,
            };
            let config = read_config(config_file.as_deref())?;
            cmd_publish(&config, file, flags, extras).await
        }
        Command::Preview { file, plain } => cmd_preview(&file, plain),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&read_config(config_file.as_deref())?),
        },
    }
}

/// Load the explicit config file, or the default one when none was given.
fn read_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Publish flags that override the config file.
struct PublishFlags {
    instance: Option<String>,
    update_if_exists: Option<bool>,
    plain: bool,
    json: bool,
}

fn parse_additional(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| eyre!("invalid --additional JSON: {e}"))?;
    if !value.is_object() {
        return Err(eyre!("invalid --additional JSON: must be a JSON object"));
    }
    Ok(Some(value))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_publish(
    config: &AppConfig,
    file: PathBuf,
    flags: PublishFlags,
    extras: PayloadExtras,
) -> Result<()> {
    let settings = HostSettings {
        instance: flags.instance.or_else(|| config.servicenow.instance.clone()),
        send_as_html: if flags.plain {
            Some(false)
        } else {
            config.servicenow.send_as_html
        },
        update_if_exists: config.servicenow.update_if_exists,
    };
    let env = EnvSnapshot::from_process();

    let inputs = PublishInputs {
        file_path: file,
        update_if_exists: flags.update_if_exists,
        extras,
    };

    info!(file = %inputs.file_path.display(), "publishing story");

    let notifier = CliNotifier::new();
    let outcome = execute_publish(&settings, &HostSecrets::default(), &env, &inputs, &notifier).await;
    notifier.spinner.finish_and_clear();
    let result = outcome?;

    if flags.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!("  sys_id: {}", result.sys_id);
        if let Some(number) = &result.number {
            println!("  Number: {number}");
        }
        println!("  URL:    {}", result.url);
        println!();
    }

    Ok(())
}

fn cmd_preview(file: &std::path::Path, plain: bool) -> Result<()> {
    let opts = ParseOptions {
        render_html: !plain,
    };
    let fields = storypub_markdown::parse_story_file(file, &opts)?;
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI notifier
// ---------------------------------------------------------------------------

/// Spinner while the publish runs; prints the outcome when notified.
struct CliNotifier {
    spinner: ProgressBar,
}

impl CliNotifier {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.set_message("Publishing story");
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl Notifier for CliNotifier {
    fn notify(&self, message: &str, notice: &Notice) {
        self.spinner.finish_and_clear();
        let marker = match notice.kind {
            NoticeKind::Success => "✔",
            NoticeKind::Info => "ℹ",
            NoticeKind::Error => "✖",
        };
        println!("  {marker} {message}");
        if let Some(url) = &notice.url {
            println!("    {url}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_publish_flags() {
        let cli = Cli::try_parse_from([
            "storypub",
            "publish",
            "story.md",
            "--no-update",
            "--plain",
            "--priority",
            "2",
            "--additional",
            r#"{"u_team":"identity"}"#,
        ])
        .expect("parse");

        match cli.command {
            Command::Publish {
                file,
                no_update,
                plain,
                priority,
                additional,
                ..
            } => {
                assert_eq!(file, PathBuf::from("story.md"));
                assert!(no_update);
                assert!(plain);
                assert_eq!(priority.as_deref(), Some("2"));
                assert!(additional.is_some());
            }
            _ => panic!("expected publish"),
        }
    }

    #[tokio::test]
    async fn preview_ignores_malformed_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("storypub.toml");
        std::fs::write(&config, "[servicenow\ninstance = ").expect("write config");
        let story = dir.path().join("story.md");
        std::fs::write(&story, "# Reset password\n\nBody").expect("write story");

        let preview = Cli::try_parse_from([
            PathBuf::from("storypub"),
            PathBuf::from("preview"),
            story,
            PathBuf::from("--config-file"),
            config.clone(),
        ])
        .expect("parse");
        run(preview).await.expect("preview runs without reading config");

        let show = Cli::try_parse_from([
            PathBuf::from("storypub"),
            PathBuf::from("config"),
            PathBuf::from("show"),
            PathBuf::from("--config-file"),
            config,
        ])
        .expect("parse");
        assert!(run(show).await.is_err());
    }

    #[test]
    fn additional_must_be_json_object() {
        assert!(parse_additional(None).unwrap().is_none());
        assert!(parse_additional(Some(r#"{"a":1}"#)).unwrap().is_some());
        assert!(parse_additional(Some("[1,2]")).is_err());
        assert!(parse_additional(Some("{oops")).is_err());
    }
}
