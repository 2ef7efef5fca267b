use annot_model::Annotation;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use export_engine::{default_backend, DocumentBackend, OpenSource};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::Storage;

#[derive(Debug, Parser)]
#[command(name = "inkmark-cli")]
#[command(about = "Inkmark CLI")]
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
    /// Draw an annotation set into a PDF and write the result.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "JSON")]
        annotations: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    page_sizes_pt: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    output: String,
    bytes_written: usize,
    annotation_count: usize,
    page_count: u32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Export { file, annotations, output } => {
            run_export(&file, &annotations, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut backend = default_backend();
    let handle = backend.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = backend.page_count(handle)?;
    let mut page_sizes_pt = Vec::with_capacity(page_count as usize);
    for page_index in 0..page_count {
        let size = backend.page_size(handle, page_index)?;
        page_sizes_pt.push(PageSizeOutput { width: size.width_pt, height: size.height_pt });
    }

    let payload = InfoOutput { path: file.display().to_string(), page_count, page_sizes_pt };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    backend.close(handle)?;

    Ok(())
}

fn run_export(file: &Path, annotations_path: &Path, output: Option<&Path>) -> Result<()> {
    ensure_pdf_exists(file)?;

    let annotation_bytes = fs::read(annotations_path).with_context(|| {
        format!("failed to read annotation set from {}", annotations_path.display())
    })?;
    let annotations: Vec<Annotation> = serde_json::from_slice(&annotation_bytes)
        .context("annotation set is not a valid JSON annotation array")?;

    let mut backend = default_backend();
    let handle = backend.open(OpenSource::from(file)).context("failed to open PDF")?;
    let page_count = backend.page_count(handle)?;

    let bytes =
        backend.export_annotated(handle, &annotations).context("failed to draw annotations")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(default_export_output);

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;

    let payload = ExportOutput {
        output: output.display().to_string(),
        bytes_written: bytes.len(),
        annotation_count: annotations.len(),
        page_count,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    backend.close(handle)?;

    Ok(())
}

fn default_export_output() -> PathBuf {
    let filename = resolve_storage()
        .and_then(|store| store.load_preferences().ok())
        .map(|prefs| prefs.export_filename)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "annotated.pdf".to_owned());

    PathBuf::from(filename)
}

fn resolve_storage() -> Option<Storage> {
    if let Some(root) = std::env::var_os("INKMARK_CONFIG_DIR") {
        return Some(Storage::with_root(PathBuf::from(root)));
    }

    Storage::from_default_project().ok()
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
