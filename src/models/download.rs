//! Model download and installation management.
//!
//! Handles downloading ggml Whisper models from HuggingFace, verifying their
//! integrity, and storing them in the user's cache directory.

use crate::error::{ParlanceError, Result};
use crate::models::catalog::{ModelInfo, get_model, resolve_name};
use std::fs;
use std::path::PathBuf;

/// Environment variable that overrides the models directory.
pub const MODELS_DIR_ENV: &str = "PARLANCE_MODELS_DIR";

/// Get the directory where models are stored.
///
/// `$PARLANCE_MODELS_DIR` if set, otherwise `~/.cache/parlance/models/`.
pub fn models_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(MODELS_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("parlance")
        .join("models")
}

/// Full path for a model file. The file may or may not exist.
pub fn model_path(name: &str) -> PathBuf {
    models_dir().join(format!("ggml-{}.bin", resolve_name(name)))
}

/// Interpret a config value as either a file path or a model name.
///
/// Values containing a path separator or ending in `.bin` are paths.
pub fn resolve_model_path(name_or_path: &str) -> PathBuf {
    let looks_like_path = name_or_path.contains(std::path::MAIN_SEPARATOR)
        || name_or_path.contains('/')
        || name_or_path.ends_with(".bin");
    if looks_like_path {
        PathBuf::from(name_or_path)
    } else {
        model_path(name_or_path)
    }
}

/// Check if a model is installed.
pub fn is_model_installed(name: &str) -> bool {
    model_path(name).is_file()
}

/// Return the path of an installed model, downloading it first when allowed.
///
/// # Errors
/// `ModelDownload` when the model is missing and cannot (or may not) be fetched.
pub async fn ensure_model(name_or_path: &str, auto_download: bool) -> Result<PathBuf> {
    let path = resolve_model_path(name_or_path);
    if path.is_file() {
        return Ok(path);
    }

    if auto_download && get_model(name_or_path).is_some() {
        tracing::info!(model = name_or_path, "Model not installed, downloading");
        return download(name_or_path).await;
    }

    Err(ParlanceError::ModelDownload {
        message: format!(
            "model '{}' is not installed at {}. Run 'parlance models install {}'",
            name_or_path,
            path.display(),
            name_or_path
        ),
    })
}

#[cfg(feature = "model-download")]
async fn download(name: &str) -> Result<PathBuf> {
    download_model(name, false).await
}

#[cfg(not(feature = "model-download"))]
async fn download(name: &str) -> Result<PathBuf> {
    Err(ParlanceError::ModelDownload {
        message: format!("model '{name}' is not installed and downloads are disabled in this build"),
    })
}

/// Download a catalog model into the models directory.
///
/// Writes to a `.part` file and renames it into place only after the SHA-1
/// checksum matches, so an interrupted download never looks installed.
#[cfg(feature = "model-download")]
pub async fn download_model(name: &str, progress: bool) -> Result<PathBuf> {
    let info = get_model(name).ok_or_else(|| ParlanceError::ModelDownload {
        message: format!(
            "model '{name}' not found in catalog. Run 'parlance models list' to see available models"
        ),
    })?;

    let path = model_path(info.name);
    if path.is_file() {
        if progress {
            eprintln!("Model '{}' is already installed at {}", info.name, path.display());
        }
        return Ok(path);
    }

    download_to_path(info, &path, progress).await?;
    Ok(path)
}

#[cfg(feature = "model-download")]
async fn download_to_path(
    info: &ModelInfo,
    output_path: &std::path::Path,
    progress: bool,
) -> Result<()> {
    use futures_util::StreamExt;
    use indicatif::{ProgressBar, ProgressStyle};
    use sha1::{Digest, Sha1};
    use std::io::Write;

    let fail = |message: String| ParlanceError::ModelDownload { message };

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| fail(format!("failed to create models directory: {e}")))?;
    }

    if progress {
        eprintln!("Downloading {} ({} MB)...", info.name, info.size_mb);
    }

    let response = reqwest::Client::new()
        .get(info.url())
        .send()
        .await
        .map_err(|e| fail(format!("failed to start download: {e}")))?;

    if !response.status().is_success() {
        return Err(fail(format!("download failed with status: {}", response.status())));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = if progress {
        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    } else {
        None
    };

    let part_path = output_path.with_extension("bin.part");
    let mut hasher = Sha1::new();
    let mut stream = response.bytes_stream();
    let mut file = fs::File::create(&part_path)
        .map_err(|e| fail(format!("failed to create output file: {e}")))?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| fail(format!("failed to read download chunk: {e}")))?;
        file.write_all(&chunk)
            .map_err(|e| fail(format!("failed to write to file: {e}")))?;
        hasher.update(&chunk);
        if let Some(ref pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }
    drop(file);

    if let Some(pb) = pb {
        pb.finish_with_message("Downloaded");
    }

    let calculated = format!("{:x}", hasher.finalize());
    if calculated != info.sha1 {
        if let Err(e) = fs::remove_file(&part_path) {
            tracing::warn!(error = %e, "Failed to remove corrupted download");
        }
        return Err(fail(format!(
            "SHA-1 checksum mismatch for {}. Expected: {}, got: {calculated}",
            info.name, info.sha1
        )));
    }

    fs::rename(&part_path, output_path)
        .map_err(|e| fail(format!("failed to move model into place: {e}")))?;

    tracing::info!(model = info.name, path = %output_path.display(), "Model installed");
    if progress {
        eprintln!("Model installed to: {}", output_path.display());
    }
    Ok(())
}

/// List installed model names by scanning the models directory for `ggml-*.bin`.
pub fn list_installed_models() -> Vec<String> {
    let entries = match fs::read_dir(models_dir()) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name();
            let model = name.to_str()?.strip_prefix("ggml-")?.strip_suffix(".bin")?;
            entry.path().is_file().then(|| model.to_string())
        })
        .collect();

    names.sort();
    names
}

/// Format model information for display.
pub fn format_model_info(model: &ModelInfo) -> String {
    let status = if is_model_installed(model.name) {
        "[installed]"
    } else {
        "[not installed]"
    };
    format!("{:16} {:5} MB   {}", model.name, model.size_mb, status)
}
