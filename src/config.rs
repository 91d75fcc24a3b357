//! Reader configuration
//!
//! Every reader takes a [`ReaderConfig`]. The defaults match what most
//! callers want; `from_env` lets deployments tune the shared-string cache and
//! scratch location without code changes.

use std::path::PathBuf;

/// Unique-string counts at or below this are cached in memory
pub const DEFAULT_SHARED_STRING_CACHE_LIMIT: usize = 1_048_576;

/// Environment variable overriding the shared-string cache limit
pub const ENV_SST_CACHE_LIMIT: &str = "SHEETSTREAM_SST_CACHE_LIMIT";

/// Environment variable overriding the scratch directory parent
pub const ENV_TEMP_DIR: &str = "SHEETSTREAM_TEMP_DIR";

/// Options shared by all readers
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Shared strings tables larger than this are resolved lazily from disk
    pub shared_string_cache_limit: usize,
    /// Row coordinate of the first row in `xls::Sheet` lookups
    pub row_offset: u32,
    /// Column coordinate of the first column in `xls::Sheet` lookups
    pub column_offset: u32,
    /// Keep merges, hyperlinks, row/column info and format colors
    pub store_extended_info: bool,
    /// Parent directory for extracted package parts
    pub temp_dir: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            shared_string_cache_limit: DEFAULT_SHARED_STRING_CACHE_LIMIT,
            row_offset: 1,
            column_offset: 1,
            store_extended_info: true,
            temp_dir: None,
        }
    }
}

impl ReaderConfig {
    /// Defaults, overridden by `SHEETSTREAM_SST_CACHE_LIMIT` and `SHEETSTREAM_TEMP_DIR`
    pub fn from_env() -> Self {
        let mut config = ReaderConfig::default();

        if let Some(limit) = std::env::var(ENV_SST_CACHE_LIMIT)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            config.shared_string_cache_limit = limit;
        }

        if let Some(dir) = std::env::var_os(ENV_TEMP_DIR).filter(|d| !d.is_empty()) {
            config.temp_dir = Some(PathBuf::from(dir));
        }

        config
    }

    pub fn with_shared_string_cache_limit(mut self, limit: usize) -> Self {
        self.shared_string_cache_limit = limit;
        self
    }

    pub fn with_offsets(mut self, row_offset: u32, column_offset: u32) -> Self {
        self.row_offset = row_offset;
        self.column_offset = column_offset;
        self
    }

    pub fn with_extended_info(mut self, store: bool) -> Self {
        self.store_extended_info = store;
        self
    }

    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::default();
        assert_eq!(config.shared_string_cache_limit, 1_048_576);
        assert_eq!(config.row_offset, 1);
        assert_eq!(config.column_offset, 1);
        assert!(config.store_extended_info);
        assert!(config.temp_dir.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ReaderConfig::default()
            .with_shared_string_cache_limit(10)
            .with_offsets(0, 0)
            .with_extended_info(false);
        assert_eq!(config.shared_string_cache_limit, 10);
        assert_eq!(config.row_offset, 0);
        assert!(!config.store_extended_info);
    }
}
