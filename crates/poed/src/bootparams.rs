//! Boot-parameter platform detection, grounded in `PoeAgent.platform_model`
//! (`poed.py`): read `/proc/cmdline`, split on spaces into `k=v` pairs,
//! and pull out the `onl_platform=<arch-manufacturer-model-rev>` token.

use std::path::Path;

/// Returns the `onl_platform` token, or `None` if the file can't be read
/// or the token is absent — the caller treats either as "unsupported
/// platform" rather than a hard failure (spec.md §4.I: "Unknown platform
/// ⇒ the daemon still starts, files still get touched, but loops idle").
pub fn platform_model(cmdline_path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(cmdline_path).ok()?;
    for token in raw.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key == "onl_platform" {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_platform_token_among_other_cmdline_args() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmdline");
        std::fs::write(&path, "console=ttyS0,115200 onl_platform=x86-64-accton-as4224-52p-r0 quiet\n").unwrap();
        assert_eq!(platform_model(&path).as_deref(), Some("x86-64-accton-as4224-52p-r0"));
    }

    #[test]
    fn missing_token_reports_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmdline");
        std::fs::write(&path, "console=ttyS0,115200 quiet\n").unwrap();
        assert!(platform_model(&path).is_none());
    }

    #[test]
    fn missing_file_reports_none() {
        assert!(platform_model(Path::new("/nonexistent/cmdline")).is_none());
    }
}
