use std::path::Path;

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Resolved ids become directory and object key segments; anything path-like is rejected
pub fn is_safe_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// File name of a path as an owned string
pub fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// An external tool the pipeline shells out to
#[derive(Debug, Clone, Copy)]
pub struct ExternalTool<'a> {
    pub command: &'a str,
    /// Argument that makes the tool exit successfully without doing work
    pub probe_arg: &'a str,
    pub purpose: &'a str,
}

/// Check if the current environment has required tools
pub async fn check_dependencies(tools: &[ExternalTool<'_>]) -> Vec<String> {
    let mut missing = Vec::new();

    for tool in tools {
        if !check_command_available(tool.command, tool.probe_arg).await {
            missing.push(format!("{} - {}", tool.command, tool.purpose));
        }
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, probe_arg: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(probe_arg)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("test/file?name"), "test_file_name");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
    }

    #[test]
    fn test_safe_path_segment() {
        assert!(is_safe_path_segment("dQw4w9WgXcQ"));
        assert!(is_safe_path_segment("a-b_c.d"));
        assert!(!is_safe_path_segment(".."));
        assert!(!is_safe_path_segment("a/b"));
        assert!(!is_safe_path_segment(""));
    }

    #[tokio::test]
    async fn reports_missing_tools() {
        let missing = check_dependencies(&[ExternalTool {
            command: "surely-not-installed-tool",
            probe_arg: "--version",
            purpose: "test tool",
        }])
        .await;
        assert_eq!(missing, vec!["surely-not-installed-tool - test tool".to_string()]);
    }
}
