use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::time::today_stamp;
use crate::{AppError, AppResult};

pub mod document;
pub mod token;

pub use document::{build_document, parse_document, ExportDocument, ImportDocument};
pub use token::{decode_token, encode_token};

const PARTIAL_SUFFIX: &str = ".partial";
pub const BACKUP_PREFIX: &str = "household-supplies-backup-";

fn tmp_path(final_path: &Path) -> PathBuf {
    let mut s = OsString::from(final_path.as_os_str());
    s.push(PARTIAL_SUFFIX);
    PathBuf::from(s)
}

/// `<dir>/<stem>.<ext>`, or `<stem>-NN.<ext>` when taken.
pub fn unique_file_path(dir: &Path, stem: &str, ext: &str) -> AppResult<PathBuf> {
    for suffix in 0..100 {
        let candidate = if suffix == 0 {
            dir.join(format!("{stem}.{ext}"))
        } else {
            dir.join(format!("{stem}-{suffix:02}.{ext}"))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(AppError::new(
        "EXPORT/NAME_COLLISION",
        "Could not allocate a unique file name",
    )
    .with_context("dir", dir.display().to_string())
    .with_context("stem", stem))
}

/// Write `contents` next to `path` and rename into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> AppResult<()> {
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_temp")
            .with_context("path", tmp.display().to_string())
    })?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        AppError::from(err)
            .with_context("operation", "rename")
            .with_context("path", path.display().to_string())
    })?;
    Ok(())
}

/// Pretty-printed backup at `household-supplies-backup-YYYY-MM-DD.json`.
pub fn write_backup_file(doc: &ExportDocument, dir: &Path) -> AppResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_out_dir")
            .with_context("path", dir.display().to_string())
    })?;
    let path = unique_file_path(dir, &format!("{BACKUP_PREFIX}{}", today_stamp()), "json")?;
    let json = serde_json::to_vec_pretty(doc)?;
    write_atomic(&path, &json)?;
    tracing::info!(
        target: "homestock",
        event = "backup_written",
        path = %path.display(),
        supplies = doc.supplies.len(),
        categories = doc.categories.len()
    );
    Ok(path)
}
