//! Owner-only storage for credentials: directories and files that nobody
//! but the current user can read.

mod shared;

// Import the platform-specific module. They are all expected to expose
// the same public APIs. Only unix targets are supported for now.
#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

// Expose the public API at the top-level.
pub use platform::{check_private_file, private_directory, private_file};
pub use shared::PlatformError;

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn create_directory() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let target = td.path().join("target");

        private_directory(&target)?;
        assert!(target.is_dir());
        // The existing directory is a valid target.
        private_directory(&target)?;
        Ok(())
    }

    #[test]
    fn detect_creation_errors() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let target = td.path().join("target");
        let fd = std::fs::File::create(&target)?;
        drop(fd);

        let err = private_directory(&target);
        match err {
            Ok(_) => {
                panic!("This was meant to fail")
            }
            Err(PlatformError::DirectoryCreationError(path, _)) => {
                assert_eq!(path, target);
            }
            Err(_) => {
                panic!("Should be a creation error, got {:?}", err)
            }
        }
        Ok(())
    }

    #[test]
    fn directory_must_be_secure() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let target = td.path().join("open");
        std::fs::create_dir(&target)?;
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))?;

        let err = private_directory(&target);
        match err {
            Ok(_) => {
                panic!("This was meant to fail")
            }
            Err(PlatformError::DirectoryPermissionError(path, _)) => {
                assert_eq!(path, target);
            }
            Err(_) => {
                panic!("Should be a permission error, got {:?}", err)
            }
        }
        Ok(())
    }

    #[test]
    fn write_then_check_file() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let file = td.path().join("credentials.toml");

        private_file(&file, "device_name = \"thing\"\n")?;
        check_private_file(&file)?;
        assert_eq!(std::fs::read_to_string(&file)?, "device_name = \"thing\"\n");

        // Overwriting keeps the file private.
        private_file(&file, "")?;
        check_private_file(&file)?;
        assert_eq!(std::fs::read_to_string(&file)?, "");
        Ok(())
    }
}
