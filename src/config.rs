use crate::error::SnapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Sync file data after every commit append.
    Full,
    /// Leave flushing to the operating system.
    OsBuffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    Strict,
    Permissive,
}

pub const MIN_PAGE_SIZE: usize = 512;
pub const MAX_PAGE_SIZE: usize = 1024 * 1024;

/// Runtime configuration shared by every log a [`crate::Registry`] opens.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub durability_mode: DurabilityMode,
    pub recovery_mode: RecoveryMode,
    /// Bytes fetched by one buffered read of the log file.
    pub page_size: usize,
    /// Upper bound on any length prefix accepted while decoding.
    pub max_record_bytes: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            durability_mode: DurabilityMode::Full,
            recovery_mode: RecoveryMode::Strict,
            page_size: 4096,
            max_record_bytes: 16 * 1024 * 1024,
        }
    }
}

impl DbConfig {
    pub fn production() -> Self {
        Self {
            durability_mode: DurabilityMode::Full,
            recovery_mode: RecoveryMode::Strict,
            ..Self::default()
        }
    }

    /// Faster, forgiving profile: no per-commit sync and torn tails are cut
    /// off on open instead of failing it.
    pub fn development() -> Self {
        Self {
            durability_mode: DurabilityMode::OsBuffered,
            recovery_mode: RecoveryMode::Permissive,
            ..Self::default()
        }
    }

    pub fn strict_recovery(&self) -> bool {
        matches!(self.recovery_mode, RecoveryMode::Strict)
    }
}

pub fn validate_config(config: &DbConfig) -> Result<(), SnapError> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&config.page_size) {
        return Err(SnapError::InvalidConfig {
            message: format!(
                "page_size must be within {MIN_PAGE_SIZE}..={MAX_PAGE_SIZE}, got {}",
                config.page_size
            ),
        });
    }
    if config.max_record_bytes == 0 || config.max_record_bytes > i32::MAX as usize {
        return Err(SnapError::InvalidConfig {
            message: format!(
                "max_record_bytes must be within 1..={}, got {}",
                i32::MAX,
                config.max_record_bytes
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DbConfig, DurabilityMode, RecoveryMode, validate_config};
    use crate::error::SnapError;

    #[test]
    fn profiles_validate() {
        validate_config(&DbConfig::default()).expect("default");
        validate_config(&DbConfig::production()).expect("production");
        let dev = DbConfig::development();
        validate_config(&dev).expect("development");
        assert_eq!(dev.durability_mode, DurabilityMode::OsBuffered);
        assert_eq!(dev.recovery_mode, RecoveryMode::Permissive);
        assert!(!dev.strict_recovery());
    }

    #[test]
    fn out_of_range_page_size_is_rejected() {
        let config = DbConfig {
            page_size: 16,
            ..DbConfig::default()
        };
        let err = validate_config(&config).expect_err("tiny page");
        assert!(matches!(err, SnapError::InvalidConfig { .. }));

        let config = DbConfig {
            max_record_bytes: 0,
            ..DbConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
