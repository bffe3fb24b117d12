//! Upload Repository
//!
//! Stages uploaded archives in the per-request temp directory.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Temp directory of a request
pub fn request_dir(temp_location: &Path, id: Uuid) -> PathBuf {
    temp_location.join(id.to_string())
}

/// Store an uploaded archive for the pipeline steps
///
/// Only the final component of the client-supplied name is kept.
pub async fn stage_tar(
    temp_location: &Path,
    id: Uuid,
    file_name: &str,
    bytes: &[u8],
) -> std::io::Result<PathBuf> {
    let dir = request_dir(temp_location, id);
    tokio::fs::create_dir_all(&dir).await?;

    let name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload.tar");

    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
