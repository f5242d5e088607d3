//! Extraction hardening: path traversal guards and output limits.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::SecurityError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum number of entries a handler will extract.
    pub max_file_count: u64,
    /// Maximum total decompressed size in bytes.
    pub max_total_size_bytes: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_file_count: 100_000,
            max_total_size_bytes: 16 * 1024 * 1024 * 1024, // 16 GB
        }
    }
}

/// Reject archive entry paths that would escape the destination directory.
pub fn check_entry_path(entry_path: &str) -> Result<(), SecurityError> {
    let traversal = || SecurityError::PathTraversal {
        path: entry_path.to_string(),
    };

    if entry_path.starts_with('/') || entry_path.starts_with('\\') {
        return Err(traversal());
    }

    // C:\ and friends
    if entry_path.len() >= 2 && entry_path.as_bytes()[1] == b':' {
        return Err(traversal());
    }

    let normalized = entry_path.replace('\\', "/");
    if Path::new(&normalized)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(traversal());
    }

    Ok(())
}

pub fn check_file_count(count: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if count > limits.max_file_count {
        return Err(SecurityError::TooManyFiles {
            count,
            limit: limits.max_file_count,
        });
    }
    Ok(())
}

pub fn check_total_size(total_bytes: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if total_bytes > limits.max_total_size_bytes {
        return Err(SecurityError::OversizedOutput {
            size_mb: total_bytes / (1024 * 1024),
            limit_mb: limits.max_total_size_bytes / (1024 * 1024),
        });
    }
    Ok(())
}
