//! Execution of validated filesystem operations.
//!
//! Every function here takes paths that already passed validation and the
//! permission check. Failures come back as `GatewayError`s mapped from the
//! underlying io error kind.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use glob::Pattern;
use tokio::fs;
use walkdir::WalkDir;

use crate::audit::OperationKind;
use crate::config::OperationsConfig;
use crate::error::GatewayError;
use crate::operations::{search_pattern, DirEntryInfo, EntryKind, FsOutput, FsRequest};
use crate::security::SafePath;

/// Run `request` against its validated paths.
pub async fn execute(
    request: FsRequest,
    source: SafePath,
    destination: Option<SafePath>,
    options: &OperationsConfig,
) -> Result<FsOutput, GatewayError> {
    match (request, destination) {
        (FsRequest::Read { .. }, _) => read_file(&source, options.max_read_bytes).await,
        (FsRequest::Copy { .. }, Some(dst)) => copy_file(&source, &dst).await,
        (FsRequest::Move { .. }, Some(dst)) => move_file(&source, &dst).await,
        (FsRequest::Delete { .. }, _) => {
            delete_file(&source, options.delete_backup_dir.as_deref()).await
        }
        (FsRequest::List { .. }, _) => list_directory(&source).await,
        (FsRequest::Mkdir { .. }, _) => create_directory(&source).await,
        (FsRequest::Search { pattern, .. }, _) => {
            search_files(&source, &pattern, options.max_search_results).await
        }
        (request, None) => Err(GatewayError::Internal(format!(
            "{} dispatched without a destination",
            request.kind()
        ))),
    }
}

pub async fn read_file(path: &SafePath, max_bytes: u64) -> Result<FsOutput, GatewayError> {
    let size = fs::metadata(path).await?.len();
    if size > max_bytes {
        return Err(GatewayError::Validation(format!(
            "file is {size} bytes, larger than the {max_bytes} byte read limit"
        )));
    }

    let content = fs::read_to_string(path).await.map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData => {
            GatewayError::Validation("file is not valid UTF-8 text".to_string())
        }
        _ => GatewayError::from(e),
    })?;

    tracing::debug!(path = %path, bytes = size, "File read");
    Ok(FsOutput::Content {
        path: path.to_string(),
        content,
    })
}

/// Copy through a temporary sibling so the destination never holds a
/// partial file.
pub async fn copy_file(source: &SafePath, destination: &SafePath) -> Result<FsOutput, GatewayError> {
    let dst = destination.as_path();
    let parent = parent_of(dst)?;
    fs::create_dir_all(parent).await?;

    let file_name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    if let Err(e) = fs::copy(source, &temp).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp, dst).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }

    tracing::info!(source = %source, destination = %destination, "File copied");
    Ok(done(OperationKind::Copy, source, Some(destination)))
}

pub async fn move_file(source: &SafePath, destination: &SafePath) -> Result<FsOutput, GatewayError> {
    fs::create_dir_all(parent_of(destination.as_path())?).await?;

    if let Err(e) = fs::rename(source, destination).await {
        if !is_cross_device(&e) {
            return Err(e.into());
        }
        tracing::debug!(source = %source, "Rename crosses devices, copying instead");
        copy_file(source, destination).await?;
        fs::remove_file(source).await?;
    }

    tracing::info!(source = %source, destination = %destination, "File moved");
    Ok(done(OperationKind::Move, source, Some(destination)))
}

/// Remove a file, first copying it into `backup_dir` when one is set. A
/// failed backup leaves the file in place.
pub async fn delete_file(
    path: &SafePath,
    backup_dir: Option<&Path>,
) -> Result<FsOutput, GatewayError> {
    let backup = match backup_dir {
        Some(dir) => Some(back_up(path, dir).await?),
        None => None,
    };

    fs::remove_file(path).await?;
    tracing::info!(path = %path, backup = ?backup, "File deleted");
    Ok(FsOutput::Done {
        operation: OperationKind::Delete,
        path: path.to_string(),
        destination: None,
        backup: backup.map(|b| b.display().to_string()),
    })
}

async fn back_up(path: &SafePath, dir: &Path) -> Result<PathBuf, GatewayError> {
    let name = path
        .as_path()
        .file_name()
        .ok_or_else(|| GatewayError::Validation(format!("{path} has no file name")))?
        .to_string_lossy()
        .into_owned();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let target = dir.join(format!("{name}.{millis}.bak"));

    let copied = async {
        fs::create_dir_all(dir).await?;
        fs::copy(path, &target).await
    };
    copied.await.map_err(|e: io::Error| {
        GatewayError::Internal(format!("backup of {path} to {} failed: {e}", dir.display()))
    })?;
    Ok(target)
}

/// Find entries under `root` whose name matches `raw_pattern`. Symbolic
/// links are reported but never followed, unreadable subdirectories are
/// skipped.
pub async fn search_files(
    root: &SafePath,
    raw_pattern: &str,
    max_results: usize,
) -> Result<FsOutput, GatewayError> {
    let pattern = search_pattern(raw_pattern)?;
    let walk_root = root.as_path().to_path_buf();
    let (matches, truncated) =
        tokio::task::spawn_blocking(move || walk_matches(&walk_root, &pattern, max_results))
            .await?;

    tracing::debug!(root = %root, pattern = raw_pattern, found = matches.len(), "Search finished");
    Ok(FsOutput::Matches {
        path: root.to_string(),
        pattern: raw_pattern.to_string(),
        matches,
        truncated,
    })
}

fn walk_matches(root: &Path, pattern: &Pattern, max_results: usize) -> (Vec<String>, bool) {
    let mut matches = Vec::new();
    let entries = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok);

    for entry in entries {
        if !pattern.matches(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if matches.len() >= max_results {
            return (matches, true);
        }
        matches.push(entry.path().display().to_string());
    }
    (matches, false)
}

pub async fn list_directory(path: &SafePath) -> Result<FsOutput, GatewayError> {
    let mut reader = fs::read_dir(path).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let meta = entry.metadata().await?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind,
            size: if kind == EntryKind::File { meta.len() } else { 0 },
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(FsOutput::Entries {
        path: path.to_string(),
        entries,
    })
}

pub async fn create_directory(path: &SafePath) -> Result<FsOutput, GatewayError> {
    if fs::try_exists(path).await? {
        return Err(GatewayError::Validation(format!("{path} already exists")));
    }
    fs::create_dir_all(path).await?;
    tracing::info!(path = %path, "Directory created");
    Ok(done(OperationKind::Mkdir, path, None))
}

fn done(operation: OperationKind, path: &SafePath, destination: Option<&SafePath>) -> FsOutput {
    FsOutput::Done {
        operation,
        path: path.to_string(),
        destination: destination.map(ToString::to_string),
        backup: None,
    }
}

fn parent_of(path: &Path) -> Result<&Path, GatewayError> {
    path.parent()
        .ok_or_else(|| GatewayError::Validation(format!("{} has no parent", path.display())))
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}
