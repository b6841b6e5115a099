use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::FileCategory;
use crate::tree::{FileTree, FileTreeNode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Invalid name pattern: {0}")]
    Pattern(String),

    #[error("Invalid size range: max_size {max} is smaller than min_size {min}")]
    InvalidSizeRange { min: u64, max: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterQuery {
    pub name_pattern: Option<String>,
    pub use_regex: bool,
    pub case_sensitive: bool,
    pub categories: Vec<FileCategory>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

impl FilterQuery {
    pub fn name(pattern: impl Into<String>) -> Self {
        Self {
            name_pattern: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn with_regex(mut self, use_regex: bool) -> Self {
        self.use_regex = use_regex;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_categories(mut self, categories: Vec<FileCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_size_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }
}

/// A compiled [`FilterQuery`].
#[derive(Debug, Clone)]
pub struct FileFilter {
    name: Option<NameMatcher>,
    categories: Vec<FileCategory>,
    min_size: Option<u64>,
    max_size: Option<u64>,
}

#[derive(Debug, Clone)]
struct NameMatcher {
    regex: Regex,
    /// Match against the full path instead of the file name.
    full_path: bool,
}

impl FileFilter {
    pub fn new(query: &FilterQuery) -> Result<Self, FilterError> {
        if let (Some(min), Some(max)) = (query.min_size, query.max_size)
            && max < min
        {
            return Err(FilterError::InvalidSizeRange { min, max });
        }

        let name = match query.name_pattern.as_deref() {
            Some(pattern) if !pattern.is_empty() => {
                let source = if query.use_regex {
                    pattern.to_string()
                } else {
                    glob_to_regex(pattern)
                };
                let regex = RegexBuilder::new(&source)
                    .case_insensitive(!query.case_sensitive)
                    .build()
                    .map_err(|e| FilterError::Pattern(e.to_string()))?;
                Some(NameMatcher {
                    regex,
                    full_path: pattern.contains('/'),
                })
            }
            _ => None,
        };

        Ok(Self {
            name,
            categories: query.categories.clone(),
            min_size: query.min_size,
            max_size: query.max_size,
        })
    }

    pub fn matches(&self, node: &FileTreeNode) -> bool {
        if node.is_directory {
            return false;
        }

        if let Some(name) = &self.name {
            let subject = if name.full_path { &node.path } else { &node.name };
            if !name.regex.is_match(subject) {
                return false;
            }
        }

        if !self.categories.is_empty()
            && !self.categories.contains(&FileCategory::from_file_name(&node.name))
        {
            return false;
        }

        self.min_size.is_none_or(|min| node.size >= min)
            && self.max_size.is_none_or(|max| node.size <= max)
    }

    pub fn apply(&self, tree: &FileTree) -> FileTree {
        tree.prune(|node| self.matches(node))
    }
}

/// Pruned copy of `tree` with the matching files and their ancestors.
pub fn filter_tree(tree: &FileTree, query: &FilterQuery) -> Result<FileTree, FilterError> {
    let filter = FileFilter::new(query)?;
    let filtered = filter.apply(tree);
    tracing::debug!(
        before = tree.file_count(),
        after = filtered.file_count(),
        "Filtered file tree"
    );
    Ok(filtered)
}

/// Translate a glob into an anchored regex.
///
/// `*` matches within one path segment, `**` across segments, `?` one
/// character other than `/`.
pub fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2 + 2);
    regex.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                // "**/" also matches zero directories.
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    regex.push('$');
    regex
}
