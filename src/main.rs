use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use music_library_server::config::{AppConfig, CliConfig, FileConfig};
use music_library_server::download_manager::{CommandBackend, DownloadManager, JobScheduler};
use music_library_server::ingestion::{FfprobeInspector, FileHandler, IngestionPipeline};
use music_library_server::library::{SqliteLibraryStore, StorageAccountant};
use music_library_server::server::{run_server, RequestsLoggingLevel, ServerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite library database.
    #[clap(value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory for audio files and cover art. Defaults to <db_dir>/library.
    #[clap(long, value_parser = parse_path)]
    pub library_dir: Option<PathBuf>,

    /// Directory for download scratch space. Defaults to <db_dir>/tmp.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// How many download jobs may run at once.
    #[clap(long)]
    pub max_concurrent_downloads: Option<usize>,

    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            library_dir: self.library_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            max_concurrent_downloads: self.max_concurrent_downloads,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    info!("Starting with {:?}", config);

    let store = Arc::new(
        SqliteLibraryStore::new(config.library_db_path())
            .with_context(|| format!("Failed to open library at {:?}", config.library_db_path()))?,
    );
    let accountant = StorageAccountant::new(store.clone(), config.downloads.default_quota_mb);

    let files = FileHandler::new(&config.library_dir, &config.temp_dir);
    files
        .init()
        .await
        .with_context(|| format!("Failed to prepare library dir {:?}", config.library_dir))?;

    let inspector = Arc::new(FfprobeInspector::new(
        &config.downloads.ffprobe_bin,
        &config.downloads.ffmpeg_bin,
    ));
    let pipeline = IngestionPipeline::new(store, accountant, files, inspector);

    let scheduler = Arc::new(JobScheduler::new(config.downloads.max_concurrent));
    let backend = Arc::new(CommandBackend::new(config.downloads.acquisition()));
    let download_manager = Arc::new(DownloadManager::new(scheduler, backend, pipeline.clone()));
    info!(
        "Download queue ready with {} slots",
        config.downloads.max_concurrent
    );

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        ..Default::default()
    };

    info!("Ready to serve at port {}!", config.port);
    run_server(server_config, download_manager, pipeline).await
}
