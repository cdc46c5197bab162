//! Install path expansion.
//!
//! Install paths and environment values may carry `%VAR%` placeholders.
//! Known placeholders resolve to stable per-user locations; unknown ones
//! fall back to the process environment and are otherwise left verbatim.

use std::path::{Path, PathBuf};

/// Expand `%VAR%` placeholders in a string.
///
/// `install_dir` resolves `%INSTALL_DIR%`; pass `None` where the install
/// directory is not decided yet (it cannot appear in `default_path`).
pub fn expand_placeholders(input: &str, install_dir: Option<&Path>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                match resolve(name, install_dir) {
                    Some(value) => out.push_str(&value),
                    None => {
                        // Unknown placeholder stays verbatim.
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Expand a configured install path into a concrete directory.
pub fn expand_install_path(raw: &str) -> PathBuf {
    PathBuf::from(expand_placeholders(raw, None))
}

fn resolve(name: &str, install_dir: Option<&Path>) -> Option<String> {
    let dir_to_string = |p: PathBuf| p.to_string_lossy().into_owned();

    match name.to_ascii_uppercase().as_str() {
        "INSTALL_DIR" => install_dir.map(|p| p.to_string_lossy().into_owned()),
        "TEMP" | "TMP" => Some(dir_to_string(std::env::temp_dir())),
        "USERPROFILE" => dirs::home_dir().map(dir_to_string),
        "LOCALAPPDATA" => dirs::data_local_dir().map(dir_to_string),
        "APPDATA" => dirs::data_dir().map(dir_to_string),
        "PROGRAMFILES" => std::env::var("ProgramFiles")
            .ok()
            .or_else(|| Some("C:/Program Files".to_string())),
        _ => std::env::var(name).ok(),
    }
}
