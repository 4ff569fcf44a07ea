use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use docupload::app::{self, DocumentUploader};
use docupload::config::Settings;
use docupload::documents::columns::DocumentView;
use docupload::error::AppError;
use docupload::upload::UploadRequest;
use docupload::utils::file_filter::FileFilter;

#[derive(Parser)]
#[command(name = "docupload", version, about = "Upload documents to a document server")]
struct Cli {
    /// Settings file (defaults to ./docupload.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server base URL, overrides the configured one
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files (or a remote URL) as one new document
    Upload {
        /// Files or directories to upload
        paths: Vec<PathBuf>,

        /// Let the server fetch content from this URL instead
        #[arg(long)]
        url: Option<String>,

        /// Only upload files from directories matching these glob patterns
        #[arg(long = "include")]
        include: Vec<String>,
    },
    /// Create a new folder
    NewFolder {
        #[arg(long)]
        title: Option<String>,

        /// Parent folder id
        #[arg(long)]
        parent: Option<String>,
    },
    /// List document table columns
    Columns {
        /// my-documents or shared-with-me
        #[arg(long)]
        view: Option<String>,

        /// Expand aggregate columns into the fields they are built from
        #[arg(long)]
        expand: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run(Cli::parse()).await {
        Err(e) => {
            error!(error = %e, "docupload failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if let Command::Columns { view, expand } = &cli.command {
        let view = view
            .as_deref()
            .map(|v| v.parse::<DocumentView>().map_err(AppError::UnknownView))
            .transpose()?;
        for line in app::describe_columns(view, *expand) {
            println!("{}", line);
        }
        return Ok(());
    }

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        settings.server.base_url = server;
    }
    info!("Starting docupload v{}", env!("CARGO_PKG_VERSION"));

    let uploader = DocumentUploader::new(settings)?;

    match cli.command {
        Command::Upload {
            paths,
            url,
            include,
        } => {
            let files = FileFilter::new(&include)?.collect(&paths)?;
            let session = uploader
                .start_upload(UploadRequest {
                    files,
                    remote_source: url,
                })
                .await?;

            if session.has_errors() {
                return Err(AppError::UploadErrors {
                    count: session.errors.len(),
                });
            }
            Ok(())
        }
        Command::NewFolder { title, parent } => uploader.create_folder(title, parent).await,
        Command::Columns { .. } => Ok(()),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let format = fmt::format().with_target(false).compact();

    // RUST_LOG wins; otherwise info for this crate only
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docupload=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
