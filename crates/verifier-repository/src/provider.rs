use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::fs_util::atomic_write_with;
use crate::{RepositoryError, Result};

/// Result of a fetch that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    NotFound(String),
}

/// Puts the artifact named `file_name` at `dest`.
///
/// Implementations must write `dest` atomically or not at all.
pub trait FileProvider: Send + Sync {
    fn fetch(&self, file_name: &str, dest: &Path) -> Result<FetchOutcome>;
}

/// Copies artifacts out of a local directory.
#[derive(Debug, Clone)]
pub struct LocalCopyProvider {
    source_dir: PathBuf,
}

impl LocalCopyProvider {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

impl FileProvider for LocalCopyProvider {
    fn fetch(&self, file_name: &str, dest: &Path) -> Result<FetchOutcome> {
        let source = self.source_dir.join(file_name);
        if !source.is_file() {
            return Ok(FetchOutcome::NotFound(format!(
                "{file_name} is not present in {}",
                self.source_dir.display()
            )));
        }
        atomic_write_with(dest, |out| {
            let mut reader = File::open(&source)?;
            io::copy(&mut reader, out)?;
            Ok(())
        })?;
        Ok(FetchOutcome::Fetched)
    }
}

const URL_REDACTION: &str = "<redacted>";

/// Downloads artifacts over HTTP(S).
///
/// The URL is the template with `{name}` replaced by the file name, or the
/// template joined with `/<file name>` when it has no placeholder.
#[derive(Debug, Clone)]
pub struct UrlDownloadProvider {
    template: String,
}

impl UrlDownloadProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn url_for(&self, file_name: &str) -> String {
        if self.template.contains("{name}") {
            self.template.replace("{name}", file_name)
        } else {
            format!("{}/{file_name}", self.template.trim_end_matches('/'))
        }
    }
}

impl FileProvider for UrlDownloadProvider {
    fn fetch(&self, file_name: &str, dest: &Path) -> Result<FetchOutcome> {
        let url = self.url_for(file_name);
        let safe_url = sanitize_url(&url);
        let response = match ureq::get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                return Ok(FetchOutcome::NotFound(format!("{safe_url} returned 404")));
            }
            Err(ureq::Error::Status(code, _)) => {
                return Err(RepositoryError::Http {
                    message: format!("server returned status {code} for {safe_url}"),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(RepositoryError::Http {
                    message: format!("transport error for {safe_url}: {transport}"),
                });
            }
        };

        atomic_write_with(dest, |out| {
            let mut reader = response.into_reader();
            io::copy(&mut reader, out)?;
            Ok(())
        })?;
        tracing::info!(target = "verifier.repository", url = %safe_url, "downloaded file");
        Ok(FetchOutcome::Fetched)
    }
}

/// Strips userinfo and query values, which may carry credentials.
pub(crate) fn sanitize_url(url: &str) -> String {
    let Some(scheme_idx) = url.find("://") else {
        return url.to_owned();
    };
    let (scheme, rest) = url.split_at(scheme_idx + 3);
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    let authority = match authority.rfind('@') {
        Some(at) => format!("{URL_REDACTION}@{}", &authority[at + 1..]),
        None => authority.to_owned(),
    };
    let tail = tail.split('#').next().unwrap_or_default();
    let tail = match tail.split_once('?') {
        Some((path, query)) => {
            let query: Vec<String> = query
                .split('&')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let key = part.split_once('=').map_or(part, |(key, _)| key);
                    format!("{key}={URL_REDACTION}")
                })
                .collect();
            format!("{path}?{}", query.join("&"))
        }
        None => tail.to_owned(),
    };
    format!("{scheme}{authority}{tail}")
}
