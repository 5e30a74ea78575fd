pub mod script;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::Rotation;
use pagemark_core::{EditorConfig, EditorSession};
use pdf_engine::{default_engine, default_mutator, OpenSource, PdfEngine};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "pagemark")]
#[command(about = "Annotate, crop and rearrange PDF pages")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Replay an action script against a PDF and export the result.
    Edit {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// JSON array of editor actions.
        #[arg(long)]
        script: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Zoom scale the script's coordinates are expressed in.
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        /// View rotation in degrees (0, 90, 180, 270).
        #[arg(long, default_value_t = 0)]
        rotation: i32,
        /// `key = value` configuration file; defaults to `PAGEMARK_*` variables.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct EditOutput {
    output: String,
    page_count: u32,
    annotations: usize,
    actions: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Edit { file, script, output, scale, rotation, config } => {
            run_edit(&file, &script, &output, scale, rotation, config.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let pages = (0..page_count)
        .map(|index| {
            engine
                .page_size(handle, index)
                .map(|size| PageSizeOutput { width: size.width_pt, height: size.height_pt })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_edit(
    file: &Path,
    script: &Path,
    output: &Path,
    scale: f32,
    rotation: i32,
    config: Option<&Path>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    let config = match config {
        Some(path) => EditorConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => EditorConfig::from_env().context("invalid PAGEMARK_* environment")?,
    };
    let rotation = Rotation::from_degrees(rotation)
        .with_context(|| format!("rotation must be a multiple of 90 degrees, got {rotation}"))?;

    let actions = fs::read_to_string(script)
        .with_context(|| format!("failed to read script {}", script.display()))
        .and_then(|json| script::parse(&json))?;

    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let mut session = EditorSession::open(default_engine(), default_mutator(), bytes, config)
        .context("failed to open PDF")?;
    session.set_scale(scale)?;
    session.set_rotation(rotation);

    script::replay(&mut session, &actions)?;

    let exported = session.export_document().context("failed to export PDF")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &exported)
        .with_context(|| format!("failed to write PDF to {}", output.display()))?;
    tracing::info!(output = %output.display(), bytes = exported.len(), "exported");

    let summary = EditOutput {
        output: output.display().to_string(),
        page_count: session.page_count(),
        annotations: session
            .annotations()
            .iter()
            .filter(|annotation| !annotation.is_crop())
            .count(),
        actions: actions.len(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
