//! Parameter stores that serve robot description text by name

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Parameter not found: {0}")]
    NotFound(String),
    #[error("Failed to read parameter {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Parameter fetch {url} returned HTTP {status}")]
    Http { url: String, status: u16 },
    #[error("Parameter request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// A key-value service holding textual parameters.
///
/// `get` resolves exactly once. The returned future owns everything it
/// needs so it can be driven from a spawned task.
pub trait ParamStore: Send + Sync {
    fn get(&self, name: &str) -> BoxFuture<'static, Result<String, StoreError>>;
}

/// In-process store, mostly useful for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryParamStore {
    params: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }
}

impl ParamStore for MemoryParamStore {
    fn get(&self, name: &str) -> BoxFuture<'static, Result<String, StoreError>> {
        let value = self
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()));
        futures_util::future::ready(value).boxed()
    }
}

/// Serves each parameter from a file in a directory.
///
/// `get("robot_description")` reads `<dir>/robot_description`, falling back
/// to `<dir>/robot_description.urdf`.
#[derive(Debug, Clone)]
pub struct FileParamStore {
    dir: PathBuf,
}

impl FileParamStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ParamStore for FileParamStore {
    fn get(&self, name: &str) -> BoxFuture<'static, Result<String, StoreError>> {
        let name = name.to_string();
        let candidates = [
            self.dir.join(&name),
            self.dir.join(format!("{}.urdf", name)),
        ];
        async move {
            for path in &candidates {
                match tokio::fs::read_to_string(path).await {
                    Ok(content) => {
                        debug!(path = %path.display(), bytes = content.len(), "Read parameter file");
                        return Ok(content);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(source) => return Err(StoreError::Io { name, source }),
                }
            }
            Err(StoreError::NotFound(name))
        }
        .boxed()
    }
}

/// Fetches parameters over HTTP from `<base_url>/<name>`
#[derive(Debug, Clone)]
pub struct HttpParamStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpParamStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn url_for(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            name.trim_start_matches('/')
        )
    }
}

impl ParamStore for HttpParamStore {
    fn get(&self, name: &str) -> BoxFuture<'static, Result<String, StoreError>> {
        let client = self.client.clone();
        let url = self.url_for(name);
        let name = name.to_string();
        async move {
            info!(url = %url, param = %name, "Fetching parameter");
            let response = client.get(&url).send().await?;
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound(name));
            }
            if !status.is_success() {
                return Err(StoreError::Http {
                    url,
                    status: status.as_u16(),
                });
            }
            Ok(response.text().await?)
        }
        .boxed()
    }
}
