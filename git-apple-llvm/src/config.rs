//! Local configuration files.
//!
//! Credentials and other per-user state live in a configuration directory,
//! overridable with `GIT_APPLE_LLVM_CONFIG_DIR`.

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::debug;

/// The configuration directory, if one can be determined.
pub fn get_config_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os("GIT_APPLE_LLVM_CONFIG_DIR") {
        return Some(dir.into());
    }
    dirs::config_dir().map(|dir| dir.join("git-apple-llvm"))
}

fn get_or_create_config_dir() -> io::Result<PathBuf> {
    let dir = get_config_dir().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "no configuration directory is available",
        )
    })?;
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Write a configuration file at the appropriate location.
///
/// Configuration files may hold access tokens; on Unix they are readable by
/// the owning user only.
pub fn write_config(filename: &str, contents: &str) -> io::Result<()> {
    let path = get_or_create_config_dir()?.join(filename);
    debug!(
        target: "apple-llvm/config",
        "Writing {} configuration to {}",
        filename,
        path.display(),
    );
    fs::write(&path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Read a configuration file from the appropriate location.
///
/// Returns the contents of the file, or `None` when it does not exist.
pub fn read_config(filename: &str) -> Option<String> {
    let path = get_config_dir()?.join(filename);
    let result = fs::read_to_string(&path).ok()?;
    debug!(
        target: "apple-llvm/config",
        "Loaded {} configuration from {}",
        filename,
        path.display(),
    );
    Some(result)
}
