//! Bundle classification for Kruskal-Wallis jobs
//!
//! Inspects the entry listing of an uploaded ZIP bundle and derives the
//! statistical groups, or rejects the whole bundle with a precise error.
//! Classification is pure and deterministic: entries are sorted before
//! processing so the result never depends on archive iteration order, and the
//! output is total (groups or an error, never a partial grouping).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::group::{ArchiveLayout, Group, GroupSet};

/// Top-level folder names excluded before layout detection
const SYSTEM_FOLDERS: &[&str] = &["__MACOSX"];

/// Maximum length of a sanitized group name
pub const MAX_GROUP_NAME_LEN: usize = 64;

/// Entry of an archive listing, as reported by the ZIP reader
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path within the archive, `/`-separated.
    pub path: String,
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }
}

/// Classification failure; always rejects the whole bundle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("bundle contains no CSV files after filtering system entries")]
    EmptyArchive,
    #[error("do not mix root-level CSVs with grouped folders")]
    MixedLayout,
    #[error("nested entry {entry} is not allowed in a flat bundle layout")]
    InvalidLayout { entry: String },
    #[error("group names collide after sanitization: {name}")]
    DuplicateGroupName { name: String },
    #[error("group name {raw:?} is empty after sanitization")]
    InvalidGroupName { raw: String },
    #[error("at least two groups are required, found {found}")]
    InsufficientGroups { found: usize },
    #[error("group {name} contains no CSV files")]
    EmptyGroup { name: String },
}

impl ClassifyError {
    /// Stable machine-readable code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ClassifyError::EmptyArchive => "EMPTY_ARCHIVE",
            ClassifyError::MixedLayout => "MIXED_KW_ZIP_LAYOUT",
            ClassifyError::InvalidLayout { .. } => "INVALID_KW_ZIP_LAYOUT",
            ClassifyError::DuplicateGroupName { .. } => "DUPLICATE_GROUP_NAME",
            ClassifyError::InvalidGroupName { .. } => "INVALID_GROUP_NAME",
            ClassifyError::InsufficientGroups { .. } => "INSUFFICIENT_GROUPS",
            ClassifyError::EmptyGroup { .. } => "EMPTY_GROUP",
        }
    }
}

/// Classify an archive listing into validated groups.
///
/// Rules are applied in order: noise filtering, layout detection, mixed-layout
/// rejection (before any grouping), group construction, name sanitization,
/// case-insensitive collision check, minimum-cardinality check.
pub fn classify_entries(entries: &[ArchiveEntry]) -> Result<GroupSet, ClassifyError> {
    let mut csv_paths: Vec<&str> = entries
        .iter()
        .filter(|entry| !entry.is_dir)
        .map(|entry| entry.path.as_str())
        .filter(|path| is_candidate(path))
        .collect();
    csv_paths.sort_unstable();

    if csv_paths.is_empty() {
        return Err(ClassifyError::EmptyArchive);
    }

    let has_nested = csv_paths.iter().any(|path| segment_count(path) > 1);
    let has_root = csv_paths.iter().any(|path| segment_count(path) == 1);

    // Mixed layouts are rejected before any group is built; partial grouping
    // would be ambiguous and must never be attempted.
    if has_nested && has_root {
        return Err(ClassifyError::MixedLayout);
    }

    let (layout, groups) = if has_nested {
        (ArchiveLayout::FolderPerGroup, folder_groups(&csv_paths)?)
    } else {
        (ArchiveLayout::FilePerGroup, flat_groups(&csv_paths)?)
    };

    check_group_rules(&groups)?;

    Ok(GroupSet { layout, groups })
}

/// Survives the noise filter: no hidden segment, not under a system-junk
/// folder, `.csv` extension (case-insensitive).
fn is_candidate(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file_name) = segments.last() else {
        return false;
    };
    if segments.iter().any(|segment| segment.starts_with('.')) {
        return false;
    }
    if SYSTEM_FOLDERS
        .iter()
        .any(|junk| segments[0].eq_ignore_ascii_case(junk))
    {
        return false;
    }
    has_csv_extension(file_name)
}

fn has_csv_extension(file_name: &str) -> bool {
    file_name.len() > 4 && file_name[file_name.len() - 4..].eq_ignore_ascii_case(".csv")
}

fn segment_count(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

fn first_segment(path: &str) -> &str {
    path.split('/').find(|s| !s.is_empty()).unwrap_or(path)
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    &name[..name.len() - 4]
}

/// Group key is the first path segment; deeper nesting is flattened into the
/// top-level group rather than creating new ones.
fn folder_groups(csv_paths: &[&str]) -> Result<Vec<Group>, ClassifyError> {
    let mut groups: BTreeMap<String, (String, String, Vec<String>)> = BTreeMap::new();
    for path in csv_paths {
        let raw = first_segment(path);
        insert_group_member(&mut groups, raw, path)?;
    }
    Ok(into_groups(groups))
}

/// Group key is the file name without its `.csv` suffix. Nested entries are
/// rejected; nesting is only legal under the folder layout.
fn flat_groups(csv_paths: &[&str]) -> Result<Vec<Group>, ClassifyError> {
    let mut groups: BTreeMap<String, (String, String, Vec<String>)> = BTreeMap::new();
    for path in csv_paths {
        if segment_count(path) > 1 {
            return Err(ClassifyError::InvalidLayout {
                entry: (*path).to_string(),
            });
        }
        let raw = file_stem(path);
        insert_group_member(&mut groups, raw, path)?;
    }
    Ok(into_groups(groups))
}

/// Shared insertion step: sanitize the raw key, then detect collisions of
/// *distinct* raw keys onto the same case-folded sanitized name. Repeated
/// occurrences of the same raw key extend the existing group.
fn insert_group_member(
    groups: &mut BTreeMap<String, (String, String, Vec<String>)>,
    raw: &str,
    path: &str,
) -> Result<(), ClassifyError> {
    let name = sanitize_group_name(raw);
    if name.is_empty() {
        return Err(ClassifyError::InvalidGroupName {
            raw: raw.to_string(),
        });
    }
    let key = name.to_lowercase();
    if let Some((existing_raw, _, files)) = groups.get_mut(&key) {
        if existing_raw != raw {
            return Err(ClassifyError::DuplicateGroupName { name });
        }
        files.push(path.to_string());
    } else {
        groups.insert(key, (raw.to_string(), name, vec![path.to_string()]));
    }
    Ok(())
}

fn into_groups(groups: BTreeMap<String, (String, String, Vec<String>)>) -> Vec<Group> {
    groups
        .into_values()
        .map(|(_, name, files)| Group { name, files })
        .collect()
}

fn check_group_rules(groups: &[Group]) -> Result<(), ClassifyError> {
    if groups.len() < 2 {
        return Err(ClassifyError::InsufficientGroups {
            found: groups.len(),
        });
    }
    // Unreachable given how groups are built, but checked anyway.
    if let Some(empty) = groups.iter().find(|group| group.files.is_empty()) {
        return Err(ClassifyError::EmptyGroup {
            name: empty.name.clone(),
        });
    }
    Ok(())
}

/// Sanitize a raw group key: trim surrounding whitespace, replace characters
/// outside `[A-Za-z0-9._-]` with `_`, collapse runs of `_`, strip leading and
/// trailing `_`, truncate to [`MAX_GROUP_NAME_LEN`] characters.
pub fn sanitize_group_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut prev_underscore = false;
    for ch in trimmed.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            ch
        } else {
            '_'
        };
        if mapped == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
        }
        out.push(mapped);
    }
    out.trim_matches('_').chars().take(MAX_GROUP_NAME_LEN).collect()
}
