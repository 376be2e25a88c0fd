use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const INITIAL_DELAY_MS: u64 = 25;
const MAX_DELAY_MS: u64 = 500;

/// Error returned when a polled file never reaches the expected state.
#[derive(Debug)]
pub struct WaitError {
    path: PathBuf,
    expected: &'static str,
    attempts: u32,
    waited: Duration,
    last_content: Option<String>,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} never {} after {} attempts over {:?}. Last content: {}",
            self.path.display(),
            self.expected,
            self.attempts,
            self.waited,
            self.last_content
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("<missing>")
        )
    }
}

impl std::error::Error for WaitError {}

/// Sleep with doubling backoff until `check` yields a value or `timeout` passes.
fn poll<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> (Option<T>, u32) {
    let start = Instant::now();
    let mut delay = Duration::from_millis(INITIAL_DELAY_MS);
    let mut attempts = 0;

    loop {
        attempts += 1;
        if let Some(value) = check() {
            return (Some(value), attempts);
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return (None, attempts);
        }

        thread::sleep(delay.min(remaining));
        delay = (delay * 2).min(Duration::from_millis(MAX_DELAY_MS));
    }
}

/// Poll a file until its content satisfies `predicate`, returning that content.
pub fn wait_for_file_content<P, F>(
    path: P,
    predicate: F,
    timeout: Duration,
) -> Result<String, WaitError>
where
    P: AsRef<Path>,
    F: Fn(&str) -> bool,
{
    let path = path.as_ref();
    let start = Instant::now();
    let mut last_content = None;

    let (found, attempts) = poll(timeout, || match fs::read_to_string(path) {
        Ok(content) if predicate(&content) => Some(content),
        Ok(content) => {
            last_content = Some(content);
            None
        }
        Err(_) => None,
    });

    found.ok_or_else(|| WaitError {
        path: path.to_path_buf(),
        expected: "matched",
        attempts,
        waited: start.elapsed(),
        last_content,
    })
}

/// Poll until `path` no longer exists.
pub fn wait_for_file_removed<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<(), WaitError> {
    let path = path.as_ref();
    let start = Instant::now();

    let (gone, attempts) = poll(timeout, || match fs::metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Some(()),
        _ => None,
    });

    gone.ok_or_else(|| WaitError {
        path: path.to_path_buf(),
        expected: "disappeared",
        attempts,
        waited: start.elapsed(),
        last_content: fs::read_to_string(path).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn wait_for_file_content_returns_existing_content() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("state.json");
        fs::write(&file, "{\"listening\": true}").unwrap();

        let content = wait_for_file_content(
            &file,
            |text| text.contains("listening"),
            Duration::from_secs(1),
        )
        .expect("should read file immediately");
        assert!(content.contains("true"));
    }

    #[test]
    fn wait_for_file_removed_times_out_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("stuck.json");
        fs::write(&file, "{}").unwrap();

        let err = wait_for_file_removed(&file, Duration::from_millis(30)).expect_err("should time out");
        assert!(err.to_string().contains("stuck.json"));
    }
}
