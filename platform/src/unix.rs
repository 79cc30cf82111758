use crate::shared::PlatformError;
use anyhow::{Context, anyhow};
use std::fs::{DirBuilder, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

const DIRECTORY_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

pub fn private_directory(root: &Path) -> Result<(), PlatformError> {
    let result = DirBuilder::new().mode(DIRECTORY_MODE).create(root);
    match result {
        Ok(_) => {
            tracing::debug!("created private directory {:?}", root);
        }
        Err(err) => {
            if err.kind() != std::io::ErrorKind::AlreadyExists {
                return Err(PlatformError::DirectoryCreationError(
                    root.to_path_buf(),
                    anyhow!("DirBuilder failed with {}", err),
                ));
            }
            if !root.is_dir() {
                return Err(PlatformError::DirectoryCreationError(
                    root.to_path_buf(),
                    anyhow!("target exists but is not a directory"),
                ));
            }
            let mode = mode(root)
                .map_err(|err| PlatformError::DirectoryPermissionError(root.to_path_buf(), err))?;
            if mode != DIRECTORY_MODE {
                return Err(PlatformError::DirectoryPermissionError(
                    root.to_path_buf(),
                    anyhow!("unexpected mode {:o}", mode),
                ));
            }
        }
    }
    Ok(())
}

/// Writes |contents| to |path|, readable and writable by the owner only.
/// An existing file is truncated and its permissions reset.
pub fn private_file(path: &Path, contents: &str) -> Result<(), PlatformError> {
    let write = || -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(path)
            .context("failed to open")?;
        // mode() only applies on creation.
        file.set_permissions(Permissions::from_mode(FILE_MODE))
            .context("failed to restrict permissions")?;
        file.write_all(contents.as_bytes())
            .context("failed to write")?;
        file.sync_all().context("failed to sync")?;
        Ok(())
    };
    write().map_err(|err| PlatformError::FileWriteError(path.to_path_buf(), err))
}

/// Verifies that neither group nor others have access to |path|.
pub fn check_private_file(path: &Path) -> Result<(), PlatformError> {
    let mode =
        mode(path).map_err(|err| PlatformError::FilePermissionError(path.to_path_buf(), err))?;
    if mode & 0o077 != 0 {
        return Err(PlatformError::FilePermissionError(
            path.to_path_buf(),
            anyhow!("unexpected mode {:o}", mode),
        ));
    }
    Ok(())
}

fn mode(path: &Path) -> anyhow::Result<u32> {
    let permissions = path
        .metadata()
        .context("failed to get metadata")?
        .permissions();
    // Only check the permissions, not the type.
    Ok(permissions.mode() & 0o777)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_config_dir_with_permissions() -> anyhow::Result<()> {
        let parent = tempfile::TempDir::new()?;
        let path = parent.path().join("config");
        private_directory(&path)?;

        // Directory permission is expected to be rwx------ aka 700.
        let metadata = path.metadata()?;
        let permissions = metadata.permissions();

        // mode is the full permission, which includes bits for the inode
        // type, etc.
        assert_eq!(permissions.mode() & 0o777, 0o700);

        // We can then call the function again just fine.
        private_directory(&path)?;

        Ok(())
    }

    #[test]
    fn reject_invalid_permissions() -> anyhow::Result<()> {
        let parent = tempfile::TempDir::new()?;
        let path = parent.path().join("config");
        DirBuilder::new().mode(0o770).create(&path)?;
        std::fs::set_permissions(&path, Permissions::from_mode(0o770))?;

        assert!(matches!(
            private_directory(&path),
            Err(PlatformError::DirectoryPermissionError(_, _))
        ));
        Ok(())
    }

    #[test]
    fn private_file_resets_permissions() -> anyhow::Result<()> {
        let parent = tempfile::TempDir::new()?;
        let path = parent.path().join("key.pem");
        std::fs::write(&path, "old")?;
        std::fs::set_permissions(&path, Permissions::from_mode(0o644))?;
        assert!(matches!(
            check_private_file(&path),
            Err(PlatformError::FilePermissionError(_, _))
        ));

        private_file(&path, "new")?;
        assert_eq!(path.metadata()?.permissions().mode() & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn check_missing_file() {
        assert!(matches!(
            check_private_file(Path::new("/does/not/exist")),
            Err(PlatformError::FilePermissionError(_, _))
        ));
    }
}
