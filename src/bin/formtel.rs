//! formtel - Command-line interface for form telemetry
//!
//! Commands:
//! - replay: Fold an NDJSON event script into a session record
//! - export: Deliver a session record through the exporter channels
//! - fields: Derive field names from a form schema

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use form_telemetry::exporter::{Exporter, HttpExporter};
use form_telemetry::replay::{parse_script, replay_session};
use form_telemetry::schema::field_names_from_str;
use form_telemetry::{SessionRecord, TelemetryError, TrackerConfig, VERSION};

/// formtel - Form session telemetry tools
#[derive(Parser)]
#[command(name = "formtel")]
#[command(author = "Synheart AI Inc")]
#[command(version = VERSION)]
#[command(about = "Replay, inspect and export form session telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fold an NDJSON event script into a session record
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Field identifiers, comma separated
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Section identifiers, comma separated (empty uses the default section)
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,

        /// Derive field identifiers from a schema file instead of --fields
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Pretty-print the record
        #[arg(long)]
        pretty: bool,
    },

    /// Deliver a session record (JSON file) to the ingestion endpoint
    Export {
        /// Record file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Ingestion base URL (overrides FORM_TELEMETRY_ENDPOINT)
        #[arg(long)]
        endpoint: Option<String>,

        /// Directory for the local fallback file
        #[arg(long)]
        fallback_dir: Option<PathBuf>,

        /// Skip the primary request, as during page teardown
        #[arg(long)]
        teardown: bool,
    },

    /// Print field names derived from a schema document
    Fields {
        /// Schema file path (use - for stdin)
        #[arg(short, long)]
        schema: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FormtelError> {
    match cli.command {
        Commands::Replay {
            input,
            fields,
            sections,
            schema,
            pretty,
        } => cmd_replay(&input, fields, &sections, schema.as_deref(), pretty),

        Commands::Export {
            input,
            endpoint,
            fallback_dir,
            teardown,
        } => cmd_export(&input, endpoint, fallback_dir, teardown),

        Commands::Fields { schema } => cmd_fields(&schema),
    }
}

fn cmd_replay(
    input: &Path,
    fields: Vec<String>,
    sections: &[String],
    schema: Option<&Path>,
    pretty: bool,
) -> Result<(), FormtelError> {
    let fields = match schema {
        Some(schema) => field_names_from_str(&read_input(schema)?),
        None => fields,
    };

    let events = parse_script(&read_input(input)?)?;
    if events.is_empty() {
        return Err(FormtelError::NoEvents);
    }

    let record = replay_session(&fields, sections, None, &events);
    let output = if pretty {
        record.to_json_pretty()?
    } else {
        record.to_json()?
    };
    println!("{}", output);

    Ok(())
}

fn cmd_export(
    input: &Path,
    endpoint: Option<String>,
    fallback_dir: Option<PathBuf>,
    teardown: bool,
) -> Result<(), FormtelError> {
    let record: SessionRecord = serde_json::from_str(&read_input(input)?)?;

    let mut config = TrackerConfig::from_env()?;
    if let Some(endpoint) = endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(dir) = fallback_dir {
        config = config.with_fallback_dir(dir);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let delivery = runtime.block_on(async {
        let exporter = HttpExporter::new(&config);
        if teardown {
            exporter.deliver_on_teardown(&record)
        } else {
            exporter.deliver(&record).await
        }
    })?;

    let report = serde_json::json!({
        "sessionId": record.session_id,
        "channel": delivery.channel(),
        "path": match &delivery {
            form_telemetry::exporter::Delivery::LocalFile(path) => Some(path.display().to_string()),
            _ => None,
        },
    });
    println!("{}", report);

    Ok(())
}

fn cmd_fields(schema: &Path) -> Result<(), FormtelError> {
    let names = field_names_from_str(&read_input(schema)?);
    println!("{}", serde_json::to_string(&names)?);
    Ok(())
}

fn read_input(path: &Path) -> Result<String, FormtelError> {
    if path.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            tracing::info!("Reading from stdin; end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

// Error handling

#[derive(Debug)]
enum FormtelError {
    Io(io::Error),
    Telemetry(TelemetryError),
    Json(serde_json::Error),
    NoEvents,
}

impl From<io::Error> for FormtelError {
    fn from(e: io::Error) -> Self {
        FormtelError::Io(e)
    }
}

impl From<TelemetryError> for FormtelError {
    fn from(e: TelemetryError) -> Self {
        FormtelError::Telemetry(e)
    }
}

impl From<serde_json::Error> for FormtelError {
    fn from(e: serde_json::Error) -> Self {
        FormtelError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FormtelError> for CliError {
    fn from(e: FormtelError) -> Self {
        match e {
            FormtelError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FormtelError::Telemetry(TelemetryError::ParseError(msg)) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be {\"at\": <RFC 3339>, \"event\": {...}}".to_string()),
            },
            FormtelError::Telemetry(TelemetryError::Config(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Check FORM_TELEMETRY_* environment variables".to_string()),
            },
            FormtelError::Telemetry(e) => CliError {
                code: "DELIVERY_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the endpoint and fallback directory".to_string()),
            },
            FormtelError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FormtelError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure the script is not empty".to_string()),
            },
        }
    }
}
