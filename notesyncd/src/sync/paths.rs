use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("resource file name is empty")]
    Empty,
    #[error("resource file name contains unsupported component")]
    UnsupportedComponent,
}

/// Location of a resource blob: `<root>/<note id>/<hash>/<file name>`.
pub fn blob_path_for(
    blob_root: &Path,
    note_id: i64,
    hash: &str,
    file_name: &str,
) -> Result<PathBuf, PathError> {
    if file_name.is_empty() || hash.is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = blob_root.join(note_id.to_string());
    for segment in [hash, file_name] {
        let mut pushed = false;
        for component in Path::new(segment).components() {
            match component {
                Component::Normal(part) => {
                    out.push(part);
                    pushed = true;
                }
                Component::CurDir => continue,
                Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                    return Err(PathError::UnsupportedComponent);
                }
            }
        }
        if !pushed {
            return Err(PathError::Empty);
        }
    }
    Ok(out)
}

/// File name used when the server did not report one.
pub fn fallback_file_name(resource_guid: &str, mime: &str) -> String {
    let extension = mime.rsplit('/').next().filter(|ext| !ext.is_empty());
    match extension {
        Some(ext) => format!("{resource_guid}.{ext}"),
        None => resource_guid.to_string(),
    }
}
