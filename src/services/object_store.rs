//! # Object Storage
//!
//! Containers of keyed binary objects. Listing is paged through an opaque
//! continuation token; both realizations here use the last key of the previous
//! page, so deleting already-listed objects never shifts later pages.

use crate::constants::storage::LIST_PAGE_SIZE;
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Listing entry for one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a container listing
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, container: &str, key: &str) -> IngestResult<Bytes>;

    async fn put(&self, container: &str, key: &str, body: Bytes, content_type: &str) -> IngestResult<()>;

    /// List one page of objects ordered by key, starting after `token`
    async fn list(&self, container: &str, token: Option<&str>) -> IngestResult<ObjectPage>;

    async fn delete(&self, container: &str, key: &str) -> IngestResult<()>;
}

/// Walk every page of a container listing
pub async fn list_all(store: &dyn ObjectStore, container: &str) -> IngestResult<Vec<ObjectSummary>> {
    let mut objects = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = store.list(container, token.as_deref()).await?;
        objects.extend(page.objects);
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    debug!(container = %container, count = objects.len(), "Listed container");
    Ok(objects)
}

fn page_after<I>(entries: I, token: Option<&str>, page_size: usize) -> ObjectPage
where
    I: Iterator<Item = ObjectSummary>,
{
    let mut objects: Vec<ObjectSummary> = entries
        .filter(|summary| token.map_or(true, |t| summary.key.as_str() > t))
        .take(page_size + 1)
        .collect();

    let next_token = if objects.len() > page_size {
        objects.truncate(page_size);
        objects.last().map(|summary| summary.key.clone())
    } else {
        None
    };

    ObjectPage { objects, next_token }
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// Process-local object store
#[derive(Debug)]
pub struct InMemoryObjectStore {
    containers: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    page_size: usize,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::with_page_size(LIST_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Store an object with an explicit modification time
    pub fn insert_at(&self, container: &str, key: &str, body: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        self.containers.write().entry(container.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                body: body.into(),
                content_type: crate::constants::storage::OCTET_STREAM_CONTENT_TYPE.to_string(),
                last_modified,
            },
        );
    }

    pub fn contains(&self, container: &str, key: &str) -> bool {
        self.containers
            .read()
            .get(container)
            .is_some_and(|objects| objects.contains_key(key))
    }

    pub fn keys(&self, container: &str) -> Vec<String> {
        self.containers
            .read()
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn content_type(&self, container: &str, key: &str) -> Option<String> {
        self.containers
            .read()
            .get(container)
            .and_then(|objects| objects.get(key))
            .map(|object| object.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, container: &str, key: &str) -> IngestResult<Bytes> {
        self.containers
            .read()
            .get(container)
            .and_then(|objects| objects.get(key))
            .map(|object| object.body.clone())
            .ok_or_else(|| IngestError::storage("get", format!("{container}/{key} not found")))
    }

    async fn put(&self, container: &str, key: &str, body: Bytes, content_type: &str) -> IngestResult<()> {
        self.containers.write().entry(container.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, container: &str, token: Option<&str>) -> IngestResult<ObjectPage> {
        let containers = self.containers.read();
        let Some(objects) = containers.get(container) else {
            return Ok(ObjectPage::default());
        };

        let entries = objects.iter().map(|(key, object)| ObjectSummary {
            key: key.clone(),
            size: object.body.len() as u64,
            last_modified: object.last_modified,
        });
        Ok(page_after(entries, token, self.page_size))
    }

    async fn delete(&self, container: &str, key: &str) -> IngestResult<()> {
        if let Some(objects) = self.containers.write().get_mut(container) {
            objects.remove(key);
        }
        Ok(())
    }
}

/// Object store backed by a local directory tree: `{root}/{container}/{key}`
#[derive(Debug, Clone)]
pub struct FileSystemObjectStore {
    root: PathBuf,
    page_size: usize,
}

impl FileSystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: LIST_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, container: &str, key: &str) -> IngestResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if key.is_empty() || escapes || container.is_empty() || container.contains(['/', '\\']) {
            return Err(IngestError::storage(
                "resolve",
                format!("invalid object address {container}/{key}"),
            ));
        }
        Ok(self.root.join(container).join(relative))
    }

    async fn collect_files(&self, container_dir: &Path) -> IngestResult<Vec<ObjectSummary>> {
        let mut summaries = Vec::new();
        let mut pending = vec![container_dir.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                let path = entry.path();
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(container_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let last_modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                summaries.push(ObjectSummary {
                    key,
                    size: metadata.len(),
                    last_modified,
                });
            }
        }

        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(summaries)
    }
}

#[async_trait]
impl ObjectStore for FileSystemObjectStore {
    async fn get(&self, container: &str, key: &str) -> IngestResult<Bytes> {
        let path = self.object_path(container, key)?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| IngestError::storage("get", format!("{}: {e}", path.display())))
    }

    async fn put(&self, container: &str, key: &str, body: Bytes, content_type: &str) -> IngestResult<()> {
        let path = self.object_path(container, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| IngestError::storage("put", format!("{}: {e}", path.display())))?;

        debug!(container = %container, key = %key, content_type = %content_type, bytes = body.len(), "Stored object");
        Ok(())
    }

    async fn list(&self, container: &str, token: Option<&str>) -> IngestResult<ObjectPage> {
        let container_dir = self.root.join(container);
        if !tokio::fs::try_exists(&container_dir).await? {
            return Ok(ObjectPage::default());
        }

        let summaries = self.collect_files(&container_dir).await?;
        Ok(page_after(summaries.into_iter(), token, self.page_size))
    }

    async fn delete(&self, container: &str, key: &str) -> IngestResult<()> {
        let path = self.object_path(container, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::storage("delete", format!("{}: {e}", path.display()))),
        }
    }
}
