//! Configuration for PFB readers.

use serde::{Deserialize, Serialize};

use crate::error::{PfbError, PfbResult};

/// Configuration shared by every reader opened with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// How file bytes are accessed.
    pub access: AccessMode,

    /// Decode tiles (and stacked files) on the rayon thread pool.
    pub parallel: bool,

    /// Minimum number of tiles in one read before decoding goes parallel.
    pub parallel_min_tiles: usize,

    /// What to do when a window reaches past the grid.
    pub boundary: BoundaryPolicy,

    /// Compare every stacked file's header against the first file's.
    pub validate_stack: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            access: AccessMode::Mmap,
            parallel: false,
            parallel_min_tiles: 4,
            boundary: BoundaryPolicy::Clamp,
            validate_stack: true,
        }
    }
}

impl ReaderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PFB_ACCESS") {
            config.access = AccessMode::from_str(&val);
        }

        if let Ok(val) = std::env::var("PFB_PARALLEL") {
            config.parallel = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("PFB_PARALLEL_MIN_TILES") {
            if let Ok(n) = val.parse() {
                config.parallel_min_tiles = n;
            }
        }

        if let Ok(val) = std::env::var("PFB_BOUNDARY") {
            config.boundary = BoundaryPolicy::from_str(&val);
        }

        if let Ok(val) = std::env::var("PFB_VALIDATE_STACK") {
            config.validate_stack = parse_flag(&val);
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> PfbResult<()> {
        if self.parallel_min_tiles == 0 {
            return Err(PfbError::invalid_argument(
                "parallel_min_tiles must be > 0",
            ));
        }
        Ok(())
    }

    /// Whether a read touching `tiles` tiles should decode in parallel.
    pub fn decode_in_parallel(&self, tiles: usize) -> bool {
        self.parallel && tiles >= self.parallel_min_tiles
    }
}

fn parse_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

/// File access strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessMode {
    /// Read-only memory map.
    #[default]
    Mmap,
    /// Positional reads on a plain file handle.
    Pread,
}

impl AccessMode {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pread" | "file" => Self::Pread,
            _ => Self::Mmap,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mmap => "mmap",
            Self::Pread => "pread",
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handling of window requests whose end lies past the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// Include everything through the last index on that axis.
    #[default]
    Clamp,
    /// Reject the request with an out-of-range error.
    Strict,
}

impl BoundaryPolicy {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "strict" | "error" => Self::Strict,
            _ => Self::Clamp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clamp => "clamp",
            Self::Strict => "strict",
        }
    }
}

impl std::fmt::Display for BoundaryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.access, AccessMode::Mmap);
        assert!(!config.parallel);
        assert_eq!(config.parallel_min_tiles, 4);
        assert_eq!(config.boundary, BoundaryPolicy::Clamp);
        assert!(config.validate_stack);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ReaderConfig {
            parallel_min_tiles: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_decode_in_parallel() {
        let mut config = ReaderConfig::default();
        assert!(!config.decode_in_parallel(100));

        config.parallel = true;
        assert!(!config.decode_in_parallel(3));
        assert!(config.decode_in_parallel(4));
    }

    #[test]
    fn test_access_mode_from_str() {
        assert_eq!(AccessMode::from_str("mmap"), AccessMode::Mmap);
        assert_eq!(AccessMode::from_str("PREAD"), AccessMode::Pread);
        assert_eq!(AccessMode::from_str("file"), AccessMode::Pread);
        assert_eq!(AccessMode::from_str("invalid"), AccessMode::Mmap);
    }

    #[test]
    fn test_boundary_policy_from_str() {
        assert_eq!(BoundaryPolicy::from_str("clamp"), BoundaryPolicy::Clamp);
        assert_eq!(BoundaryPolicy::from_str("Strict"), BoundaryPolicy::Strict);
        assert_eq!(BoundaryPolicy::from_str("error"), BoundaryPolicy::Strict);
        assert_eq!(BoundaryPolicy::from_str("other"), BoundaryPolicy::Clamp);
    }

    #[test]
    fn test_config_serde() {
        let config = ReaderConfig {
            access: AccessMode::Pread,
            boundary: BoundaryPolicy::Strict,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ReaderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
