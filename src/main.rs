use color_tokens::config::Configuration;
use color_tokens::error::AppError;
use color_tokens::pipeline::{ExtractionOrchestrator, ExtractorFactory};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

const USAGE: &str = "color-tokens <image> [config]";

fn init_logging() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logging();

    let mut args = std::env::args_os().skip(1);
    let image_path = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| AppError::Usage(USAGE.to_string()))?;
    let config_path = args.next().map(PathBuf::from);

    let configuration = Configuration::load(config_path.as_deref())?;
    let registry = ExtractorFactory::from_config(&configuration)?;
    info!("Extractors: {:?}", registry.names());

    let image = tokio::fs::read(&image_path).await?;
    let image_id = image_id(&image_path);

    let orchestrator = ExtractionOrchestrator::new(configuration);
    let result = orchestrator.extract_all(&image, &image_id, &registry).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn image_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
