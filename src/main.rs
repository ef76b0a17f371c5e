use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use data_sweeper::config::Config;
use data_sweeper::export::ConversionTarget;
use data_sweeper::server;
use data_sweeper::session::Event;
use data_sweeper::session::Message;
use data_sweeper::session::Session;
use data_sweeper::session::UploadOutcome;
use data_sweeper::spreadsheet::UploadedFile;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "data-sweeper")]
#[command(about = "Clean, chart and convert CSV and Excel files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the web interface (default)
    Serve {
        /// Address to bind, overrides DATA_SWEEPER_HOST
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on, overrides DATA_SWEEPER_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Clean and convert files without the web interface
    Convert {
        /// CSV or XLSX files to convert
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output format: csv or xlsx
        #[arg(long, default_value = "csv")]
        to: ConversionTarget,
        /// Remove duplicate rows
        #[arg(long)]
        dedupe: bool,
        /// Fill missing numeric values with the column mean
        #[arg(long)]
        fill_missing: bool,
        /// Columns to keep, comma-separated, in output order
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
        /// Directory for converted files
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to read configuration")?;

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            server::serve(config).await?;
        }
        Command::Convert {
            files,
            to,
            dedupe,
            fill_missing,
            columns,
            out_dir,
        } => {
            fs::create_dir_all(&out_dir).with_context(|| format!("Failed to create {}", out_dir.display()))?;
            let mut events = Vec::new();
            if dedupe || fill_missing {
                events.push(Event::SetCleaning { enabled: true });
            }
            if dedupe {
                events.push(Event::RemoveDuplicates);
            }
            if fill_missing {
                events.push(Event::FillMissing);
            }
            if let Some(columns) = columns {
                events.push(Event::SelectColumns { columns });
            }
            events.push(Event::SetTarget { target: to });
            events.push(Event::Convert);

            let mut session = Session::new(config.preview_rows);
            let mut failed = 0;
            for path in &files {
                if let Err(e) = convert_file(&mut session, path, &events, &out_dir) {
                    error!("{e:#}");
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{failed} of {} files failed", files.len());
            }
        }
    }
    Ok(())
}

fn convert_file(session: &mut Session, path: &Path, events: &[Event], out_dir: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let id: Uuid = match session.upload(UploadedFile::new(name, bytes)) {
        UploadOutcome::Accepted { snapshot } => snapshot.id,
        UploadOutcome::Rejected { error, .. } => bail!(error),
    };
    for event in events {
        let snapshot = session.apply(id, event.clone())?;
        match snapshot.message {
            Some(Message::Error(message)) => bail!("{}: {message}", snapshot.file_name),
            Some(Message::Success(message)) => info!("{message}"),
            None => {}
        }
    }

    let artifact = session.artifact(id)?;
    let output = out_dir.join(&artifact.file_name);
    fs::write(&output, &artifact.bytes).with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {}", output.display());
    Ok(())
}
