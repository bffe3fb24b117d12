//! Result Repository
//!
//! Handles the result files, one `<id>.json` per finished request.

use std::path::{Path, PathBuf};

use echidna_core::domain::request::RequestRecord;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Path of the result file of a request
pub fn path_for(dir: &Path, id: Uuid) -> PathBuf {
    dir.join(format!("{}.json", id))
}

/// Write the final record of a request
///
/// The file is written next to its destination and renamed into place, so
/// a reader sees either no file or the complete one.
pub async fn save(dir: &Path, record: &RequestRecord) -> Result<PathBuf, PersistError> {
    tokio::fs::create_dir_all(dir).await.map_err(io_error(dir))?;

    let mut body = serde_json::to_vec_pretty(record)?;
    body.push(b'\n');

    let dest = path_for(dir, record.id);
    let tmp = dir.join(format!(".{}.json.tmp", record.id));
    tokio::fs::write(&tmp, &body).await.map_err(io_error(&tmp))?;
    tokio::fs::rename(&tmp, &dest).await.map_err(io_error(&dest))?;

    Ok(dest)
}

/// Raw contents of a result file, if the request has one
pub async fn load(dir: &Path, id: Uuid) -> Result<Option<Vec<u8>>, PersistError> {
    let path = path_for(dir, id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(&path)(e)),
    }
}
