use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use stackgen_core::ZipEntry;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const PREBUILD_SCRIPT: &str = "prebuild.sh";
pub const POSTBUILD_SCRIPT: &str = "postbuild.sh";
pub const ARCHIVE_FILE: &str = "build.zip";

/// Rendered artifact, ready to be written.
#[derive(Debug, Clone, Copy)]
pub struct BundleContents<'a> {
    pub compose: &'a str,
    pub prebuild: &'a str,
    pub postbuild: &'a str,
    pub files: &'a [ZipEntry],
    /// Also pack everything into `build.zip`.
    pub archive: bool,
}

/// Marks a directory as written by stackgen. Only such directories (or
/// empty ones) are ever replaced.
pub const ARTIFACT_MARKER: &str = ".stackgen-artifact";

/// Writes the artifact into `output_dir`.
///
/// Everything is staged in a sibling `<output_dir>.partial` directory and
/// renamed into place at the end, so a failed build never leaves a
/// half-written `output_dir` behind. A previous artifact is moved aside to
/// `<output_dir>.old` and only deleted once the new one is in place.
pub fn write_bundle(output_dir: &Path, contents: &BundleContents<'_>) -> Result<PathBuf, BundleError> {
    ensure_replaceable(output_dir)?;
    let staging = sibling_dir(output_dir, "partial");

    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| BundleError::Cleanup {
            path: staging.clone(),
            source: e,
        })?;
    }
    std::fs::create_dir_all(&staging).map_err(|e| BundleError::Create {
        path: staging.clone(),
        source: e,
    })?;

    if let Err(e) = stage(&staging, contents) {
        remove_quietly(&staging);
        return Err(e);
    }

    if let Err(e) = swap_into_place(&staging, output_dir) {
        remove_quietly(&staging);
        return Err(e);
    }

    tracing::info!(path = %output_dir.display(), files = contents.files.len(), "Artifact written");
    Ok(output_dir.to_path_buf())
}

/// Refuses `.`, ancestors of the working directory and any existing
/// directory that is neither empty nor a previous artifact.
fn ensure_replaceable(output_dir: &Path) -> Result<(), BundleError> {
    let refuse = |reason: &'static str| BundleError::RefusedOutput {
        path: output_dir.to_path_buf(),
        reason,
    };

    if output_dir.file_name().is_none() {
        return Err(refuse("not a named directory"));
    }
    if !output_dir.exists() {
        return Ok(());
    }
    if !output_dir.is_dir() {
        return Err(refuse("exists and is not a directory"));
    }

    let resolved = output_dir.canonicalize().map_err(|e| BundleError::Cleanup {
        path: output_dir.to_path_buf(),
        source: e,
    })?;
    if let Ok(cwd) = std::env::current_dir().and_then(|d| d.canonicalize()) {
        if cwd.starts_with(&resolved) {
            return Err(refuse("contains the working directory"));
        }
    }

    if resolved.join(ARTIFACT_MARKER).is_file() {
        return Ok(());
    }
    let mut entries = std::fs::read_dir(&resolved).map_err(|e| BundleError::Cleanup {
        path: output_dir.to_path_buf(),
        source: e,
    })?;
    if entries.next().is_some() {
        return Err(refuse("not empty and not a stackgen artifact"));
    }
    Ok(())
}

fn swap_into_place(staging: &Path, output_dir: &Path) -> Result<(), BundleError> {
    let finalize = |e| BundleError::Finalize {
        path: output_dir.to_path_buf(),
        source: e,
    };

    if !output_dir.exists() {
        return std::fs::rename(staging, output_dir).map_err(finalize);
    }

    let previous = sibling_dir(output_dir, "old");
    if previous.exists() {
        std::fs::remove_dir_all(&previous).map_err(|e| BundleError::Cleanup {
            path: previous.clone(),
            source: e,
        })?;
    }
    std::fs::rename(output_dir, &previous).map_err(finalize)?;

    if let Err(e) = std::fs::rename(staging, output_dir) {
        if let Err(restore) = std::fs::rename(&previous, output_dir) {
            tracing::warn!(path = %previous.display(), error = %restore, "Failed to restore previous artifact");
        }
        return Err(finalize(e));
    }
    remove_quietly(&previous);
    Ok(())
}

fn remove_quietly(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        tracing::warn!(path = %dir.display(), error = %e, "Failed to remove directory");
    }
}

fn sibling_dir(output_dir: &Path, suffix: &str) -> PathBuf {
    let mut name = output_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "build".into());
    name.push(".");
    name.push(suffix);
    output_dir.with_file_name(name)
}

fn stage(dir: &Path, contents: &BundleContents<'_>) -> Result<(), BundleError> {
    let mut written: Vec<String> = Vec::new();

    for (name, body, executable) in [
        (COMPOSE_FILE, contents.compose, false),
        (PREBUILD_SCRIPT, contents.prebuild, true),
        (POSTBUILD_SCRIPT, contents.postbuild, true),
    ] {
        let path = dir.join(name);
        std::fs::write(&path, body).map_err(|e| BundleError::Write {
            path: path.clone(),
            source: e,
        })?;
        if executable {
            make_executable(&path)?;
        }
        written.push(name.to_owned());
    }

    for entry in contents.files {
        let relative = safe_relative_path(&entry.archive_path)?;
        let dst = dir.join(&relative);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BundleError::Create {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::copy(&entry.source, &dst).map_err(|e| BundleError::CopyFile {
            path: entry.source.clone(),
            source: e,
        })?;
        if !written.contains(&entry.archive_path) {
            written.push(entry.archive_path.clone());
        }
    }

    if contents.archive {
        write_archive(dir, &written)?;
    }

    let marker = dir.join(ARTIFACT_MARKER);
    std::fs::write(&marker, "").map_err(|e| BundleError::Write {
        path: marker.clone(),
        source: e,
    })?;
    Ok(())
}

/// Archive paths must stay inside the artifact directory.
fn safe_relative_path(archive_path: &str) -> Result<PathBuf, BundleError> {
    let path = Path::new(archive_path);
    let unsafe_path = || BundleError::UnsafePath {
        archive_path: archive_path.to_owned(),
    };

    if archive_path.is_empty() {
        return Err(unsafe_path());
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(unsafe_path()),
        }
    }
    if [COMPOSE_FILE, PREBUILD_SCRIPT, POSTBUILD_SCRIPT, ARCHIVE_FILE, ARTIFACT_MARKER].contains(&archive_path) {
        return Err(unsafe_path());
    }
    Ok(path.to_path_buf())
}

fn write_archive(dir: &Path, names: &[String]) -> Result<(), BundleError> {
    let path = dir.join(ARCHIVE_FILE);
    let file = File::create(&path).map_err(|e| BundleError::Write {
        path: path.clone(),
        source: e,
    })?;
    let archive_err = |e| BundleError::Archive {
        path: path.clone(),
        source: e,
    };

    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for name in names {
        let mode = if name == PREBUILD_SCRIPT || name == POSTBUILD_SCRIPT {
            0o755
        } else {
            0o644
        };
        zip.start_file(name.as_str(), options.unix_permissions(mode))
            .map_err(archive_err)?;
        let data = std::fs::read(dir.join(name)).map_err(|e| BundleError::CopyFile {
            path: dir.join(name),
            source: e,
        })?;
        zip.write_all(&data).map_err(|e| BundleError::Write {
            path: path.clone(),
            source: e,
        })?;
    }
    zip.finish().map_err(archive_err)?;
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), BundleError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| BundleError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), BundleError> {
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("failed to clean up directory {path}")]
    Cleanup {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    Create {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy file {path}")]
    CopyFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("refusing to replace {path}: {reason}")]
    RefusedOutput { path: std::path::PathBuf, reason: &'static str },
    #[error("archive path {archive_path:?} escapes or overwrites the artifact")]
    UnsafePath { archive_path: String },
    #[error("failed to write archive {path}")]
    Archive {
        path: std::path::PathBuf,
        source: zip::result::ZipError,
    },
    #[error("failed to move artifact into {path}")]
    Finalize {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
