use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::config::Config;

/// File cache for tokens and connection data
pub struct Cache {
    cache_dir: PathBuf,
}

impl Cache {
    /// Create a cache manager in the user cache directory
    pub fn new() -> Result<Self> {
        Self::at(Config::cache_dir()?)
    }

    /// Create a cache manager rooted at `cache_dir`
    pub fn at(cache_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", cache_dir))?;
        Ok(Self { cache_dir })
    }

    fn file_path(&self, filename: &str) -> PathBuf {
        self.cache_dir.join(filename)
    }

    /// Save data to cache
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let path = self.file_path(filename);
        let content = serde_json::to_string_pretty(data).context("Failed to serialize data")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write cache file: {:?}", path))?;
        Ok(())
    }

    /// Load data from cache
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {:?}", path))?;
        let data = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cache file: {:?}", path))?;
        Ok(Some(data))
    }

    /// Delete a cache file
    pub fn delete(&self, filename: &str) -> Result<()> {
        let path = self.file_path(filename);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete cache file: {:?}", path))?;
        }
        Ok(())
    }
}

// Token cache file name
pub const TOKENS_FILE: &str = "tokens.json";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessToken, TokenStore};

    #[test]
    fn test_token_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::at(dir.path().join("m365")).unwrap();

        let loaded: Option<TokenStore> = cache.load(TOKENS_FILE).unwrap();
        assert!(loaded.is_none());

        let mut store = TokenStore::default();
        store.set_refresh_token(AccessToken {
            value: "rt".to_string(),
            expires: 42,
        });
        store.spo_url = Some("https://contoso.sharepoint.com".to_string());
        cache.save(TOKENS_FILE, &store).unwrap();

        let loaded: TokenStore = cache.load(TOKENS_FILE).unwrap().unwrap();
        assert_eq!(loaded.refresh_token().unwrap().value, "rt");
        assert_eq!(loaded.spo_url.as_deref(), Some("https://contoso.sharepoint.com"));

        cache.delete(TOKENS_FILE).unwrap();
        assert!(!dir.path().join("m365").join(TOKENS_FILE).exists());
    }

    #[test]
    fn test_corrupt_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::at(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join(TOKENS_FILE), "{not json").unwrap();

        let result: Result<Option<TokenStore>> = cache.load(TOKENS_FILE);
        assert!(result.is_err());
    }
}
