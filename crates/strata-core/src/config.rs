use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_refs::validate_branch_name;
use strata_store::{
    PresignConfig, DEFAULT_LIST_PAGE_SIZE, DEFAULT_PART_SIZE, DEFAULT_PRESIGN_PARALLELISM,
    DEFAULT_PRESIGN_TTL, MAX_PRESIGN_TTL, MAX_SINGLE_PUT_SIZE, MIN_PART_SIZE,
};

use crate::error::{CoreError, CoreResult};

/// Tunables of the core services.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Name of the branch created with every project.
    pub default_branch: String,
    pub document_timeout_ms: u64,
    pub storage_timeout_ms: u64,
    pub presign_ttl_secs: u64,
    pub part_size: u64,
    pub presign_parallelism: usize,
    pub gc_page_size: usize,
    /// Objects younger than this are never garbage-collected.
    pub gc_grace_secs: u64,
    /// Interval of the background reconcile loop; `0` disables it.
    pub gc_interval_secs: u64,
    pub endpoint: String,
    pub bucket: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_branch: "stable".into(),
            document_timeout_ms: 5_000,
            storage_timeout_ms: 60_000,
            presign_ttl_secs: DEFAULT_PRESIGN_TTL.as_secs(),
            part_size: DEFAULT_PART_SIZE,
            presign_parallelism: DEFAULT_PRESIGN_PARALLELISM,
            gc_page_size: DEFAULT_LIST_PAGE_SIZE,
            gc_grace_secs: 60 * 60,
            gc_interval_secs: 0,
            endpoint: "http://127.0.0.1:9000".into(),
            bucket: "strata".into(),
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> CoreResult<()> {
        validate_branch_name(&self.default_branch)
            .map_err(|e| CoreError::invalid(format!("default_branch: {e}")))?;
        if self.part_size < MIN_PART_SIZE {
            return Err(CoreError::invalid(format!(
                "part_size {} is below the minimum of {MIN_PART_SIZE}",
                self.part_size
            )));
        }
        if self.gc_page_size == 0 {
            return Err(CoreError::invalid("gc_page_size must be positive"));
        }
        if self.presign_parallelism == 0 {
            return Err(CoreError::invalid("presign_parallelism must be positive"));
        }
        if self.document_timeout_ms == 0 || self.storage_timeout_ms == 0 {
            return Err(CoreError::invalid("timeouts must be positive"));
        }
        if self.presign_ttl_secs == 0 || self.presign_ttl_secs > MAX_PRESIGN_TTL.as_secs() {
            return Err(CoreError::invalid(format!(
                "presign_ttl_secs must be between 1 and {}",
                MAX_PRESIGN_TTL.as_secs()
            )));
        }
        url::Url::parse(&self.endpoint)
            .map_err(|e| CoreError::invalid(format!("endpoint: {e}")))?;
        if self.bucket.is_empty() {
            return Err(CoreError::invalid("bucket must not be empty"));
        }
        Ok(())
    }

    pub fn document_timeout(&self) -> Duration {
        Duration::from_millis(self.document_timeout_ms)
    }

    /// Age after which a commit above its branch head counts as orphaned.
    /// A commit in flight finishes its repoint within one document timeout.
    pub fn orphan_age(&self) -> Duration {
        self.document_timeout().saturating_mul(2)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }

    pub fn gc_grace(&self) -> Duration {
        Duration::from_secs(self.gc_grace_secs)
    }

    /// `None` when the background reconcile loop is disabled.
    pub fn gc_interval(&self) -> Option<Duration> {
        (self.gc_interval_secs > 0).then(|| Duration::from_secs(self.gc_interval_secs))
    }

    pub fn presign_config(&self) -> PresignConfig {
        PresignConfig {
            part_size: self.part_size,
            parallelism: self.presign_parallelism,
            max_single_put_size: MAX_SINGLE_PUT_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = CoreConfig::default();
        c.validate().unwrap();
        assert_eq!(c.default_branch, "stable");
        assert_eq!(c.document_timeout(), Duration::from_secs(5));
        assert_eq!(c.storage_timeout(), Duration::from_secs(60));
        assert!(c.gc_interval().is_none());
    }

    #[test]
    fn rejects_small_parts_and_empty_pages() {
        let small = CoreConfig {
            part_size: MIN_PART_SIZE - 1,
            ..Default::default()
        };
        assert!(small.validate().is_err());

        let empty_page = CoreConfig {
            gc_page_size: 0,
            ..Default::default()
        };
        assert!(empty_page.validate().is_err());

        let bad_branch = CoreConfig {
            default_branch: "has space".into(),
            ..Default::default()
        };
        assert!(bad_branch.validate().is_err());
    }

    #[test]
    fn presign_ttl_is_capped_at_seven_days() {
        let week = CoreConfig {
            presign_ttl_secs: MAX_PRESIGN_TTL.as_secs(),
            ..Default::default()
        };
        week.validate().unwrap();

        let huge = CoreConfig {
            presign_ttl_secs: 10_000_000_000_000,
            ..Default::default()
        };
        assert!(huge.validate().is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let c: CoreConfig = toml::from_str("part_size = 10485760\nbucket = \"blobs\"").unwrap();
        assert_eq!(c.part_size, 10 * 1024 * 1024);
        assert_eq!(c.bucket, "blobs");
        assert_eq!(c.default_branch, "stable");
    }
}
