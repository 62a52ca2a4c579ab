//! Artifact downloads with a bounded retry loop.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use tempfile::NamedTempFile;

use crate::error::FetchError;
use crate::keep::config::FetchConfig;

/// Downloads one artifact to a destination path. Implementations must leave
/// the destination untouched on failure; a partially written file would read
/// as a present artifact.
pub trait MediaFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Run `attempt` up to `attempts` times, sleeping `delay` between failures.
/// The last attempt's error is returned.
pub fn run_attempts<T, E>(
    attempts: u32,
    delay: Duration,
    mut attempt: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) if tries >= attempts => return Err(err),
            Err(_) => thread::sleep(delay),
        }
    }
}

pub struct HttpMediaFetcher {
    client: Client,
    attempts: u32,
    retry_delay: Duration,
}

impl HttpMediaFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| FetchError::Transport {
                url: String::new(),
                source,
            })?;
        Ok(HttpMediaFetcher {
            client,
            attempts: config.attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    fn fetch_once(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let mut tmp = NamedTempFile::new_in(parent).map_err(|source| FetchError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
        let written = io::copy(&mut response, tmp.as_file_mut()).map_err(|source| {
            FetchError::Io {
                path: dest.to_path_buf(),
                source,
            }
        })?;
        if written == 0 {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }
        tmp.persist(dest).map_err(|err| FetchError::Io {
            path: dest.to_path_buf(),
            source: err.error,
        })?;
        Ok(())
    }
}

impl MediaFetcher for HttpMediaFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| FetchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        run_attempts(self.attempts, self.retry_delay, || self.fetch_once(url, dest))
    }
}

#[cfg(test)]
mod tests {
    use super::run_attempts;
    use std::time::Duration;

    #[test]
    fn retries_are_bounded_and_final_error_surfaces() {
        let mut calls = 0;
        let result: Result<(), &str> = run_attempts(3, Duration::ZERO, || {
            calls += 1;
            Err("boom")
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(calls, 3);
    }

    #[test]
    fn success_stops_the_loop() {
        let mut calls = 0;
        let result: Result<u32, &str> = run_attempts(3, Duration::ZERO, || {
            calls += 1;
            if calls < 2 { Err("boom") } else { Ok(7) }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 2);
    }
}
