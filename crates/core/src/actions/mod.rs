//! The three things the tool can do with an enumerated archive.

pub mod extract;
pub mod integrity;
pub mod list;

use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    List,
    Test,
    Extract,
}

impl Action {
    /// Resolve command-line flags. List wins over Test, Test over Extract,
    /// and Extract is the default.
    pub fn from_flags(list: bool, test: bool, _extract: bool) -> Self {
        if list {
            Action::List
        } else if test {
            Action::Test
        } else {
            Action::Extract
        }
    }
}

/// What an action produced, for the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionOutcome {
    Listed { records: usize },
    Tested { files: u64, temp_dir: PathBuf },
    Extracted { destination: PathBuf, files: usize },
}
