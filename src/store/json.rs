use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use super::{ForecastSink, ForecastStore, IssueRepository};
use crate::aggregate::{self, issue_to_value};
use crate::models::{ForecastKey, ForecastRecord, IssueRecord};

/// Flat-file store: the corpus is an object of owner key to issue array and the
/// forecasts are a single array document.
#[derive(Debug, Clone)]
pub struct JsonStore {
    issues_path: PathBuf,
    forecasts_path: PathBuf,
}

impl JsonStore {
    pub fn new(issues_path: impl Into<PathBuf>, forecasts_path: impl Into<PathBuf>) -> Self {
        Self {
            issues_path: issues_path.into(),
            forecasts_path: forecasts_path.into(),
        }
    }

    async fn read_corpus(&self) -> anyhow::Result<Value> {
        Ok(read_document(&self.issues_path)
            .await?
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn update_owner<F>(&self, owner: &str, update: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Vec<Value>),
    {
        let _lock = FileLock::acquire(lock_path(&self.issues_path)).await?;
        let mut corpus = self.read_corpus().await?;
        let groups = corpus.as_object_mut().with_context(|| {
            format!(
                "{} must hold an object of owner issue lists",
                self.issues_path.display()
            )
        })?;
        let entry = groups
            .entry(owner.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(entries) = entry {
            update(entries);
        }
        write_document(&self.issues_path, &corpus).await
    }

    async fn read_forecasts(&self) -> anyhow::Result<Vec<ForecastRecord>> {
        match read_document(&self.forecasts_path).await? {
            Some(value) => serde_json::from_value(value).with_context(|| {
                format!("invalid forecast document {}", self.forecasts_path.display())
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Exclusive advisory lock on a sidecar file, released when dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub async fn acquire(path: PathBuf) -> anyhow::Result<Self> {
        tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .with_context(|| format!("failed to open lock file {}", path.display()))?;
            file.lock_exclusive()
                .with_context(|| format!("failed to lock {}", path.display()))?;
            Ok::<_, anyhow::Error>(FileLock { file })
        })
        .await
        .context("lock task failed")?
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

async fn read_document(path: &Path) -> anyhow::Result<Option<Value>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "document missing, treating as empty");
            return Ok(None);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let value = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(Some(value))
}

/// Writes a uniquely named sibling temp file and renames it over `path`, so
/// readers never observe a half-written document.
async fn write_document<T: serde::Serialize>(path: &Path, document: &T) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(document)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&body)
            .and_then(|_| tmp.as_file().sync_all())
            .with_context(|| format!("failed to write {}", tmp.path().display()))?;
        tmp.persist(&path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok::<_, anyhow::Error>(())
    })
    .await
    .context("write task failed")?
}

impl IssueRepository for JsonStore {
    async fn list_issues(&self) -> anyhow::Result<Vec<IssueRecord>> {
        let corpus = self.read_corpus().await?;
        Ok(aggregate::flatten_corpus(&corpus))
    }

    async fn append_issues(&self, owner: &str, issues: &[IssueRecord]) -> anyhow::Result<usize> {
        self.update_owner(owner, |entries| {
            entries.extend(issues.iter().map(issue_to_value));
        })
        .await?;
        Ok(issues.len())
    }

    async fn replace_owner_issues(
        &self,
        owner: &str,
        issues: &[IssueRecord],
    ) -> anyhow::Result<usize> {
        self.update_owner(owner, |entries| {
            *entries = issues.iter().map(issue_to_value).collect();
        })
        .await?;
        Ok(issues.len())
    }
}

impl ForecastSink for JsonStore {
    type Lock = FileLock;

    async fn lock(&self) -> anyhow::Result<FileLock> {
        FileLock::acquire(lock_path(&self.forecasts_path)).await
    }

    async fn replace_forecasts(&self, forecasts: &[ForecastRecord]) -> anyhow::Result<()> {
        write_document(&self.forecasts_path, &forecasts).await
    }
}

impl ForecastStore for JsonStore {
    async fn list_forecasts(&self) -> anyhow::Result<Vec<ForecastRecord>> {
        self.read_forecasts().await
    }

    async fn upvote(&self, key: &ForecastKey) -> anyhow::Result<bool> {
        let _lock = self.lock().await?;
        let mut forecasts = self.read_forecasts().await?;
        let Some(forecast) = forecasts.iter_mut().find(|f| f.key() == *key) else {
            return Ok(false);
        };
        forecast.upvotes += 1;
        write_document(&self.forecasts_path, &forecasts).await?;
        Ok(true)
    }
}
