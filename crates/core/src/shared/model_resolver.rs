use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{
    MODEL_CACHE_DIR_NAME, OUTPUT_MODEL_NAME, PROPOSAL_MODEL_NAME, REFINEMENT_MODEL_NAME,
};

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("model {name} not found in {}", searched.display())]
    NotFound { name: String, searched: PathBuf },
}

/// Progress callback: `(model_name, bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(&str, u64, u64) + Send>;

/// Where to look for model files.
#[derive(Clone, Debug, Default)]
pub struct ModelSource {
    /// Explicit directory; when set, it is the only place searched.
    pub model_dir: Option<PathBuf>,
    /// Base URL that `<name>` is appended to when a model is not cached.
    pub base_url: Option<String>,
}

/// Resolved paths of the three cascade models.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeModels {
    pub proposal: PathBuf,
    pub refinement: PathBuf,
    pub output: PathBuf,
}

impl CascadeModels {
    /// Standard file names inside `dir`, without checking that they exist.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            proposal: dir.join(PROPOSAL_MODEL_NAME),
            refinement: dir.join(REFINEMENT_MODEL_NAME),
            output: dir.join(OUTPUT_MODEL_NAME),
        }
    }
}

/// Resolves all three cascade models from `source`.
pub fn resolve_cascade(
    source: &ModelSource,
    progress: Option<&ProgressFn>,
) -> Result<CascadeModels, ModelResolveError> {
    Ok(CascadeModels {
        proposal: resolve(PROPOSAL_MODEL_NAME, source, progress)?,
        refinement: resolve(REFINEMENT_MODEL_NAME, source, progress)?,
        output: resolve(OUTPUT_MODEL_NAME, source, progress)?,
    })
}

/// Resolve a model file by name.
///
/// Resolution order:
/// 1. The explicit model directory, if one was given (searched exclusively)
/// 2. User cache directory (platform-specific)
/// 3. Download from `base_url` into the cache
pub fn resolve(
    name: &str,
    source: &ModelSource,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(dir) = &source.model_dir {
        let path = dir.join(name);
        return if path.exists() {
            Ok(path)
        } else {
            Err(ModelResolveError::NotFound {
                name: name.to_string(),
                searched: dir.clone(),
            })
        };
    }

    resolve_in_cache(name, &model_cache_dir()?, source.base_url.as_deref(), progress)
}

fn resolve_in_cache(
    name: &str,
    cache_dir: &Path,
    base_url: Option<&str>,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        log::debug!("using cached model {}", cached_path.display());
        return Ok(cached_path);
    }

    let Some(base_url) = base_url else {
        return Err(ModelResolveError::NotFound {
            name: name.to_string(),
            searched: cache_dir.to_path_buf(),
        });
    };

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    let url = format!("{}/{name}", base_url.trim_end_matches('/'));
    log::info!("downloading {name} from {url}");
    download(&url, &cached_path, |done, total| {
        if let Some(cb) = progress {
            cb(name, done, total);
        }
    })?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceCascade/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceCascade/models/` or `~/.cache/FaceCascade/models/`
/// - Windows: `%LOCALAPPDATA%/FaceCascade/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join(MODEL_CACHE_DIR_NAME).join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join(MODEL_CACHE_DIR_NAME).join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(
    url: &str,
    dest: &Path,
    progress: impl Fn(u64, u64),
) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: impl Fn(u64, u64),
) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = fs::File::create(temp_path).map_err(|e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;

    let write_err = |e: std::io::Error| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    };

    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        progress(downloaded, total);
    }

    file.flush().map_err(write_err)?;
    drop(file);

    // rename keeps a half-written model from ever appearing under its real name
    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
