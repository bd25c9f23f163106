//! Group types produced by archive classification

use serde::{Deserialize, Serialize};

/// Layout detected for an uploaded Kruskal-Wallis bundle
///
/// Ephemeral classification result; not persisted beyond job creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveLayout {
    /// Each top-level folder is one group; nested CSVs are flattened into it.
    FolderPerGroup,
    /// Each root-level CSV is its own group, named after the file stem.
    FilePerGroup,
}

/// One statistical group extracted from a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Sanitized name, unique case-insensitively within the archive.
    pub name: String,
    /// Archive paths of the CSV entries contributing to this group, sorted.
    pub files: Vec<String>,
}

/// Validated classification result: at least two groups, each non-empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSet {
    pub layout: ArchiveLayout,
    pub groups: Vec<Group>,
}

impl GroupSet {
    pub fn names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }
}
