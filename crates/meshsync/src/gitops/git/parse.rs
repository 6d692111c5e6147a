//! Git output parsing helpers.

use std::process::Output;

/// Formats a git error with both stdout and stderr for better debugging.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// True when git reports there was nothing new to bring in.
pub fn is_already_up_to_date(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("already up to date") || lower.contains("already up-to-date")
}

/// True when a `checkout -b` failed only because the branch exists.
pub fn is_already_exists(text: &str) -> bool {
    text.to_lowercase().contains("already exists")
}

/// Extracts the commit id from `git rev-parse` output.
///
/// Returns `None` for anything that is not a full hex object id.
pub fn parse_commit_id(stdout: &str) -> Option<String> {
    let id = stdout.trim();
    let valid = (id.len() == 40 || id.len() == 64) && id.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_already_up_to_date() {
        assert!(is_already_up_to_date("Already up to date."));
        assert!(is_already_up_to_date("Already up-to-date."));
        assert!(!is_already_up_to_date("Fast-forward\n 1 file changed"));
    }

    #[test]
    fn test_is_already_exists() {
        assert!(is_already_exists(
            "fatal: a branch named 'main' already exists"
        ));
        assert!(!is_already_exists("Switched to a new branch 'main'"));
    }

    #[test]
    fn test_parse_commit_id() {
        let sha = "3f786850e387550fdab836ed7e6dc881de23001b";
        assert_eq!(parse_commit_id(&format!("{sha}\n")), Some(sha.to_string()));
        assert_eq!(parse_commit_id("HEAD"), None);
        assert_eq!(parse_commit_id(""), None);
    }

    #[cfg(unix)]
    mod unix_tests {
        use super::*;
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        fn make_output(status_code: i32, stdout: &[u8], stderr: &[u8]) -> Output {
            Output {
                status: ExitStatus::from_raw(status_code << 8),
                stdout: stdout.to_vec(),
                stderr: stderr.to_vec(),
            }
        }

        #[test]
        fn test_format_git_error_empty_output() {
            let output = make_output(1, b"", b"");
            assert_eq!(format_git_error(&output), "Command failed with exit code 1");
        }

        #[test]
        fn test_format_git_error_both() {
            let output = make_output(1, b"some output", b"some error");
            assert_eq!(format_git_error(&output), "some error\nsome output");
        }
    }
}
