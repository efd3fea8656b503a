use std::path::{Path, PathBuf};

use super::error::{Error, Result};

/// Turn an archive entry name into a path relative to the output root.
///
/// Both `/` and `\` separate components. Empty and `.` components are
/// dropped. Absolute names, drive prefixes and `..` components are rejected.
pub fn sanitize_entry_name(name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");

    if normalized.starts_with('/') {
        return Err(Error::unsafe_path(name, "absolute path"));
    }

    let mut relative = PathBuf::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(Error::unsafe_path(name, "parent directory segment")),
            _ if part.contains(':') => {
                return Err(Error::unsafe_path(name, "drive or stream prefix"));
            }
            _ => relative.push(part),
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(Error::unsafe_path(name, "empty path"));
    }

    Ok(relative)
}

/// Resolve an entry name under `output_root`.
///
/// The result is always a descendant of `output_root`.
pub fn resolve_under(output_root: &Path, name: &str) -> Result<PathBuf> {
    let relative = sanitize_entry_name(name)?;
    let resolved = output_root.join(&relative);

    if !resolved.starts_with(output_root) || resolved == output_root {
        return Err(Error::unsafe_path(name, "resolves outside the output root"));
    }

    Ok(resolved)
}
