use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use vecpic_client::config::{self, ClientConfig, ResponseMode};
use vecpic_client::export::{self, ExportTarget};
use vecpic_client::image_processor;
use vecpic_client::photo_source::{self, FilePhotoSource};
use vecpic_client::uploader::{
    HttpBackend, ResultPayload, SessionSnapshot, SubmitOutcome, UploadBackend, UploadSession,
};

#[derive(Parser)]
#[command(name = "vecpic", version, about = "Vectorize photos with a VecPic server")]
struct Cli {
    /// Config file to use instead of the per-user one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a photo and save the processed result
    Convert {
        image: PathBuf,
        #[arg(short, long)]
        preset: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
        /// raster, vector or auto
        #[arg(long)]
        mode: Option<ResponseMode>,
        /// Output file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the result to a temp file for sharing instead
        #[arg(long, conflicts_with = "output")]
        share: bool,
    },
    /// Check that the server answers
    Health {
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Inspect or reset the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Delete old exported and shared results
    Cleanup {
        #[arg(long, default_value_t = 30)]
        days: u64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Path,
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logger first so config load warnings are visible, level applied afterwards
    let level_from_env = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    if !level_from_env {
        log::set_max_level(log::LevelFilter::Info);
    }

    let (config_path, config) = match &cli.config {
        Some(path) => {
            let config = config::load_config_from(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (path.clone(), config)
        }
        None => (config::get_config_path()?, config::load_config()?),
    };

    if !level_from_env {
        log::set_max_level(config.log_level_filter());
    }

    log::info!("Starting VecPic client");

    match cli.command {
        Command::Convert {
            image,
            preset,
            endpoint,
            mode,
            output,
            share,
        } => {
            let config = apply_overrides(config, endpoint, mode)?;
            convert(Arc::new(config), image, preset, output, share).await
        }
        Command::Health { endpoint } => {
            let config = apply_overrides(config, endpoint, None)?;
            let backend = HttpBackend::new(Duration::from_secs(config.timeout_secs))?;
            if backend.health_check(&config.endpoint).await? {
                println!("{} is up", config.endpoint);
                Ok(())
            } else {
                bail!("{} did not report OK", config.endpoint)
            }
        }
        Command::Config { action } => {
            match action {
                ConfigAction::Show => println!("{}", serde_json::to_string_pretty(&config)?),
                ConfigAction::Path => println!("{}", config_path.display()),
                ConfigAction::Reset => {
                    config::reset_config_at(&config_path)?;
                    println!("Configuration reset to defaults");
                }
            }
            Ok(())
        }
        Command::Cleanup { days } => {
            let removed = export::cleanup_exports(days)?;
            println!("Removed {} old result files", removed);
            Ok(())
        }
    }
}

fn apply_overrides(
    mut config: ClientConfig,
    endpoint: Option<String>,
    mode: Option<ResponseMode>,
) -> anyhow::Result<ClientConfig> {
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if let Some(mode) = mode {
        config.response_mode = mode;
    }
    config::validate_config(&config)?;
    Ok(config)
}

async fn convert(
    config: Arc<ClientConfig>,
    image: PathBuf,
    preset: Option<String>,
    output: Option<PathBuf>,
    share: bool,
) -> anyhow::Result<()> {
    let backend = Arc::new(HttpBackend::new(Duration::from_secs(config.timeout_secs))?);
    let session = UploadSession::new(Arc::clone(&config), backend)?;
    let watcher = tokio::spawn(render_states(session.subscribe()));

    let ctrlc_session = session.clone();
    ctrlc::set_handler(move || {
        if !ctrlc_session.cancel() {
            std::process::exit(130);
        }
    })
    .context("installing Ctrl+C handler")?;

    let source = FilePhotoSource::new(&image, &config);
    if !photo_source::load_into(&session, &source).await {
        bail!("could not load {}", image.display());
    }

    if let Some(preset) = preset {
        session.select_preset(&preset)?;
    }

    let outcome = session.spawn_submit()?.await?;
    let snapshot = session.snapshot();
    watcher.abort();

    match outcome {
        SubmitOutcome::Succeeded => {
            let payload = snapshot
                .result
                .context("session succeeded without a result")?;
            describe_result(&payload);

            let source_name = snapshot.filename.unwrap_or_default();
            let path = if share {
                export::write_shareable(&payload).await?
            } else {
                let target = match output {
                    Some(path) if path.is_dir() => ExportTarget::Directory(path),
                    Some(path) => ExportTarget::File(path),
                    None => ExportTarget::Directory(export::default_export_dir(&config)?),
                };
                export::write_result(&payload, &source_name, &target).await?
            };
            println!("{}", path.display());
            Ok(())
        }
        SubmitOutcome::Failed { category } => bail!("upload failed: {}", category),
        SubmitOutcome::Discarded => {
            eprintln!("Upload cancelled");
            std::process::exit(130);
        }
    }
}

async fn render_states(mut states: watch::Receiver<SessionSnapshot>) {
    while states.changed().await.is_ok() {
        let snapshot = states.borrow_and_update().clone();
        match &snapshot.error_message {
            Some(message) => eprintln!("[{}] {}", snapshot.status, message),
            None => eprintln!(
                "[{}] {} (preset {})",
                snapshot.status,
                snapshot.filename.as_deref().unwrap_or("no image"),
                snapshot.preset
            ),
        }
    }
}

fn describe_result(payload: &ResultPayload) {
    match payload {
        ResultPayload::Vector(markup) => {
            log::info!("Received {} characters of vector markup", markup.len());
        }
        ResultPayload::Raster { bytes, format } => match image_processor::get_image_info(bytes) {
            Ok((width, height)) => {
                log::info!("Received {:?} image, {}x{}", format, width, height)
            }
            Err(e) => log::warn!("Received {:?} image that could not be measured: {}", format, e),
        },
    }
}
