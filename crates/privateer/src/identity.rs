use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const IDENTITY_FILE: &str = ".privateer_identity";

/// Directory holding the identity file for a given config path.
pub fn identity_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn write_identity(root: &Path, name: &str) -> Result<()> {
    fs::write(root.join(IDENTITY_FILE), format!("{name}\n"))?;
    Ok(())
}

pub fn read_identity(root: &Path) -> Result<Option<String>> {
    let path = root.join(IDENTITY_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let name = fs::read_to_string(&path)?.trim().to_string();
    Ok((!name.is_empty()).then_some(name))
}

/// `--as` wins over the identity file.
pub fn find_identity(as_arg: Option<&str>, root: &Path) -> Result<String> {
    if let Some(name) = as_arg {
        return Ok(name.to_string());
    }
    read_identity(root)?
        .ok_or_else(|| Error::msg("Can't determine identity; did you forget to configure?"))
}
