use std::path::{Component, Path};

use crate::ServerError;

/// Validates that a client-supplied file name cannot escape the storage
/// directory.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_file_name(file_name: &str) -> Result<(), ServerError> {
    if file_name.is_empty() {
        return Err(ServerError::Validation("empty file name".into()));
    }

    let path = Path::new(file_name);

    if path.is_absolute() {
        return Err(ServerError::Validation(format!(
            "absolute path not allowed: {file_name}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(ServerError::Validation(format!(
                    "parent directory traversal not allowed: {file_name}"
                )));
            }
            Component::Prefix(_) => {
                return Err(ServerError::Validation(format!(
                    "path prefix not allowed: {file_name}"
                )));
            }
            Component::RootDir => {
                return Err(ServerError::Validation(format!(
                    "absolute path not allowed: {file_name}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_file_name("../../../etc/passwd").is_err());
        assert!(validate_file_name("sub/../../escape").is_err());
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(validate_file_name("/etc/passwd").is_err());
    }

    #[test]
    fn rejects_windows_prefix() {
        assert!(validate_file_name("C:\\Windows\\system32").is_err());
    }

    #[test]
    fn allows_plain_names() {
        assert!(validate_file_name("video.mp4").is_ok());
        assert!(validate_file_name("archive.tar.gz").is_ok());
        assert!(validate_file_name("./report.pdf").is_ok());
    }
}
