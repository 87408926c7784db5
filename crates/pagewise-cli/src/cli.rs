//! Command-line surface for synchronizing ISP console resources.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use pagewise_core::ControllerConfig;
use pagewise_telemetry::{
    CommandScope, CommandSpan, LogFormat, LoggingConfig, init_logging, log_format_from_config,
};
use reqwest::Client;
use serde_json::Value;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::client::{AppContext, CliError, CliResult, parse_api_key, parse_url};
use crate::commands::list::{handle_export, handle_list};
use crate::commands::mutate::{handle_create, handle_remove, handle_update};
use crate::output::OutputFormat;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_API_URL: &str = "http://127.0.0.1:7080";
const CONFIG_CONTROLLER_KEY: &str = "controller";

/// Parses CLI arguments, executes the requested command, and returns the
/// process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let document = match load_config_document(cli.config.as_deref()) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };

    let format = log_format_from_config(document.as_ref()).unwrap_or_else(LogFormat::infer);
    let logging = LoggingConfig {
        level: &cli.log_level,
        format,
        build_sha: option_env!("PAGEWISE_BUILD_SHA").unwrap_or("dev"),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err}");
    }

    let command_name = command_label(&cli.command);
    let _span = CommandSpan::enter(command_name);
    let scope = CommandScope::new(Uuid::new_v4().to_string(), cli.command.resource());

    let result = scope.run(dispatch(cli, document)).await;
    match result {
        Ok(()) => {
            info!(command = command_name, "command completed");
            0
        }
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli, document: Option<Value>) -> CliResult<()> {
    let ctx = build_context(&cli, document.as_ref())?;
    match cli.command {
        Command::Ls(args) => handle_list(&ctx, args, cli.output).await,
        Command::Export(args) => handle_export(&ctx, args).await,
        Command::Create(args) => handle_create(&ctx, args).await,
        Command::Update(args) => handle_update(&ctx, args).await,
        Command::Rm(args) => handle_remove(&ctx, args).await,
    }
}

fn build_context(cli: &Cli, document: Option<&Value>) -> CliResult<AppContext> {
    let client = Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()
        .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))?;
    Ok(AppContext {
        client,
        base_url: cli.api_url.clone(),
        api_key: parse_api_key(cli.api_key.clone())?,
        config: controller_config(document)?,
    })
}

fn load_config_document(path: Option<&Path>) -> CliResult<Option<Value>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let raw = fs::read_to_string(path).map_err(|err| {
        CliError::failure(anyhow!(
            "failed to read config file '{}': {err}",
            path.display()
        ))
    })?;
    serde_json::from_str(&raw).map(Some).map_err(|err| {
        CliError::validation(format!(
            "config file '{}' is not valid JSON: {err}",
            path.display()
        ))
    })
}

/// Controller tunables for one-shot commands; there is no spinner to keep on
/// screen, so the minimum loading time defaults to zero.
fn controller_config(document: Option<&Value>) -> CliResult<ControllerConfig> {
    match document.and_then(|value| value.get(CONFIG_CONTROLLER_KEY)) {
        Some(section) => Ok(ControllerConfig::from_json(section)?),
        None => Ok(ControllerConfig {
            min_loading_ms: 0,
            ..ControllerConfig::default()
        }),
    }
}

#[derive(Parser)]
#[command(
    name = "pagewise",
    about = "List, export, and edit paginated ISP console resources"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "PAGEWISE_API_URL",
        value_parser = parse_url,
        default_value = DEFAULT_API_URL
    )]
    api_url: Url,
    #[arg(long, global = true, env = "PAGEWISE_API_KEY")]
    api_key: Option<String>,
    #[arg(
        long,
        global = true,
        env = "PAGEWISE_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    timeout: u64,
    #[arg(long, global = true, env = "PAGEWISE_LOG_LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long, global = true, env = "PAGEWISE_CONFIG")]
    config: Option<PathBuf>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render rows"
    )]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch one page of a resource.
    #[command(alias = "list")]
    Ls(ListArgs),
    /// Write one page of a resource as CSV.
    Export(ExportArgs),
    /// Create a resource item from a JSON object.
    Create(WriteArgs),
    /// Replace a resource item with a JSON object.
    Update(WriteArgs),
    /// Delete resource items by identifier.
    Rm(RemoveArgs),
}

impl Command {
    fn resource(&self) -> &str {
        match self {
            Self::Ls(args) => &args.resource,
            Self::Export(args) => &args.list.resource,
            Self::Create(args) | Self::Update(args) => &args.resource,
            Self::Rm(args) => &args.resource,
        }
    }
}

/// Query controls shared by every reading command.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct QueryArgs {
    /// Shared query string to start from (e.g. `page=2&status=active`).
    #[arg(long)]
    pub(crate) query: Option<String>,
    #[arg(long)]
    pub(crate) search: Option<String>,
    #[arg(long)]
    pub(crate) page: Option<u32>,
    #[arg(long)]
    pub(crate) page_size: Option<u32>,
    /// Filter as FIELD=VALUE; repeat for several values.
    #[arg(long = "filter", value_name = "FIELD=VALUE")]
    pub(crate) filters: Vec<String>,
    /// Sort as FIELD, FIELD:asc or FIELD:desc.
    #[arg(long)]
    pub(crate) sort: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ListArgs {
    pub(crate) resource: String,
    #[command(flatten)]
    pub(crate) query: QueryArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ExportArgs {
    #[command(flatten)]
    pub(crate) list: ListArgs,
    /// Destination file; stdout when omitted.
    #[arg(long)]
    pub(crate) out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct WriteArgs {
    pub(crate) resource: String,
    /// Item as a JSON object carrying an `id`.
    #[arg(long)]
    pub(crate) json: String,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct RemoveArgs {
    pub(crate) resource: String,
    #[arg(required = true, num_args = 1..)]
    pub(crate) ids: Vec<String>,
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Ls(_) => "ls",
        Command::Export(_) => "export",
        Command::Create(_) => "create",
        Command::Update(_) => "update",
        Command::Rm(_) => "rm",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::env;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).expect("arguments parse")
    }

    #[test]
    fn list_arguments_flatten_query_controls() {
        let cli = parse(&[
            "pagewise",
            "list",
            "subscribers",
            "--filter",
            "status=active",
            "--filter",
            "plan=fiber-100",
            "--sort",
            "name:desc",
            "--page",
            "3",
            "--output",
            "json",
        ]);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(command_label(&cli.command), "ls");
        let Command::Ls(args) = cli.command else {
            panic!("expected ls");
        };
        assert_eq!(args.resource, "subscribers");
        assert_eq!(args.query.filters, vec!["status=active", "plan=fiber-100"]);
        assert_eq!(args.query.sort.as_deref(), Some("name:desc"));
        assert_eq!(args.query.page, Some(3));
    }

    #[test]
    fn remove_requires_ids_and_keeps_the_resource() {
        assert!(Cli::try_parse_from(["pagewise", "rm", "users"]).is_err());
        let cli = parse(&["pagewise", "rm", "users", "4", "7"]);
        assert_eq!(cli.command.resource(), "users");
        let Command::Rm(args) = cli.command else {
            panic!("expected rm");
        };
        assert_eq!(args.ids, vec!["4", "7"]);
    }

    #[test]
    fn invalid_api_urls_are_rejected_at_parse_time() {
        assert!(
            Cli::try_parse_from(["pagewise", "--api-url", "nope", "ls", "users"]).is_err()
        );
    }

    #[test]
    fn controller_section_overrides_defaults() {
        let defaults = controller_config(None).expect("defaults are valid");
        assert_eq!(defaults.min_loading_ms, 0);

        let document = json!({"log_format": "json", "controller": {"default_page_size": 25}});
        let config = controller_config(Some(&document)).expect("valid section");
        assert_eq!(config.default_page_size, 25);

        let invalid = json!({"controller": {"default_page_size": 0}});
        let err = controller_config(Some(&invalid)).expect_err("invalid section");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn config_documents_are_read_from_disk() {
        assert!(load_config_document(None).expect("no file").is_none());

        let path = env::temp_dir().join(format!("pagewise-cli-{}.json", Uuid::new_v4()));
        let mut file = fs::File::create(&path).expect("create file");
        file.write_all(br#"{"log_format": "pretty"}"#)
            .expect("write file");
        let document = load_config_document(Some(&path))
            .expect("readable file")
            .expect("document present");
        assert_eq!(document["log_format"], "pretty");

        fs::write(&path, "{not json").expect("overwrite file");
        let err = load_config_document(Some(&path)).expect_err("invalid JSON");
        assert_eq!(err.exit_code(), 2);
        fs::remove_file(&path).expect("cleanup");

        let err = load_config_document(Some(&path)).expect_err("missing file");
        assert_eq!(err.exit_code(), 3);
    }
}
