//! Resolution of image references to local files.
//!
//! The renderer only needs an [`AssetResolver`]. [`LocalAssets`] uses
//! references as they are; [`CachingResolver`] downloads each URL once into a
//! directory, naming the file after a hash of the URL.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Maps an image reference to the path the include directive should use.
/// The same reference must always resolve to the same path.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Result<String>;
}

impl<T: AssetResolver + ?Sized> AssetResolver for Arc<T> {
    fn resolve(&self, url: &str) -> Result<String> {
        (**self).resolve(url)
    }
}

/// File extension of the last path segment of `url`, ignoring any query
/// string or fragment.
pub fn extension(url: &str) -> Option<&str> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    let segment = path.rsplit('/').next().unwrap_or(path);
    Path::new(segment)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
}

/// Uses image references unchanged, for images already on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAssets;

impl AssetResolver for LocalAssets {
    fn resolve(&self, url: &str) -> Result<String> {
        extension(url).ok_or_else(|| Error::MissingExtension(url.to_string()))?;
        Ok(url.to_string())
    }
}

/// Downloads the bytes behind a URL.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

impl<F> Fetch for F
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self(url)
    }
}

/// Blocking HTTP fetcher.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("mdtex/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Fetch {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(HttpFetcher { client })
    }
}

#[cfg(feature = "http")]
impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |message: String| Error::Fetch {
            url: url.to_string(),
            message,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP status {status}")));
        }
        let bytes = response.bytes().map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Content cache keyed by URL.
///
/// Each asset is stored as `<dir>/<md5 of url>.<ext>`. A file that already
/// exists is reused without fetching, and concurrent resolves of one URL
/// are serialised so it is fetched at most once. A URL's lock only lives
/// while some resolve of it is in flight.
pub struct CachingResolver<F> {
    dir: PathBuf,
    fetcher: F,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<F: Fetch> CachingResolver<F> {
    pub fn new(dir: impl Into<PathBuf>, fetcher: F) -> Self {
        CachingResolver {
            dir: dir.into(),
            fetcher,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Where `url` is (or will be) cached.
    pub fn cache_path(&self, url: &str) -> Result<PathBuf> {
        let ext = extension(url).ok_or_else(|| Error::MissingExtension(url.to_string()))?;
        let hash = md5::compute(url.as_bytes());
        Ok(self.dir.join(format!("{hash:x}.{ext}")))
    }

    fn lock_for(&self, url: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(url.to_string()).or_default().clone()
    }

    /// Drop the lock for `url` once no resolve holds it. Clones are only
    /// made under the map lock, so the count can't grow while we look.
    fn release(&self, url: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(url).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(url);
        }
    }

    fn fetch_into(&self, url: &str, path: &Path) -> Result<()> {
        if path.exists() {
            debug!(url, path = %path.display(), "asset cache hit");
            return Ok(());
        }

        info!(url, "fetching asset");
        let bytes = self.fetcher.fetch(url)?;
        fs::create_dir_all(&self.dir)?;
        // Write under a temporary name so a failed write never leaves a
        // truncated file that later resolves would treat as cached.
        let partial = path.with_extension("part");
        fs::write(&partial, bytes)?;
        fs::rename(&partial, path)?;
        debug!(url, path = %path.display(), "asset cached");
        Ok(())
    }
}

impl<F: Fetch> AssetResolver for CachingResolver<F> {
    fn resolve(&self, url: &str) -> Result<String> {
        let path = self.cache_path(url)?;
        let lock = self.lock_for(url);
        let fetched = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.fetch_into(url, &path)
        };
        self.release(url, lock);

        fetched.map(|()| path.display().to_string())
    }
}
