//! Full-text search over the files of a package.
//!
//! One compiled matcher per query; files are scanned one at a time and the
//! cancellation token is only polled between files, so every file's matches
//! are reported whole or not at all.

pub mod session;

pub use session::{SearchSession, SearchTicket};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_BINARY_SAMPLE_LEN;
use crate::unpack::ArchiveReader;

pub const MAX_CONTEXT_LINES: usize = 10;

/// Share of printable bytes below which a sample counts as binary.
const MIN_PRINTABLE_PERCENT: usize = 75;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("Invalid search pattern: {0}")]
    Pattern(String),

    #[error("Search task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub pattern: String,
    pub use_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    /// Lines of context around each match, at most [`MAX_CONTEXT_LINES`].
    pub context_lines: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            use_regex: false,
            case_sensitive: false,
            whole_word: false,
            context_lines: 2,
        }
    }
}

impl SearchQuery {
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Default::default()
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            use_regex: true,
            ..Default::default()
        }
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_whole_word(mut self, whole_word: bool) -> Self {
        self.whole_word = whole_word;
        self
    }

    pub fn with_context_lines(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub file_path: String,
    /// 1-based.
    pub line: usize,
    /// 1-based, in characters.
    pub column: usize,
    pub matched_text: String,
    pub lines_before: Vec<String>,
    pub lines_after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSearchResult {
    pub file_path: String,
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchProgress {
    pub files_processed: usize,
    pub total_files: usize,
    pub current_file: String,
    pub matches_found: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub files_scanned: usize,
    pub files_skipped_binary: usize,
    pub files_failed: Vec<FailedFile>,
    pub total_matches: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<FileSearchResult>,
    pub stats: SearchStats,
    /// The search stopped early; `results` only covers files finished before
    /// the cancellation was seen.
    pub cancelled: bool,
}

/// What scanning a single file produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileScan {
    Binary,
    Text(Vec<SearchMatch>),
}

#[derive(Debug, Clone)]
pub struct SearchEngine {
    regex: Regex,
    context_lines: usize,
    binary_sample_len: usize,
}

impl SearchEngine {
    pub fn new(query: &SearchQuery) -> Result<Self, SearchError> {
        Ok(Self {
            regex: compile_query(query)?,
            context_lines: query.context_lines.min(MAX_CONTEXT_LINES),
            binary_sample_len: DEFAULT_BINARY_SAMPLE_LEN,
        })
    }

    pub fn with_binary_sample_len(mut self, len: usize) -> Self {
        self.binary_sample_len = len.max(1);
        self
    }

    /// Scan one file. Binary content is never searched.
    pub fn search_file(&self, path: &str, content: &[u8]) -> FileScan {
        if is_binary(content, self.binary_sample_len) {
            return FileScan::Binary;
        }

        let text = String::from_utf8_lossy(content);
        let lines: Vec<&str> = text.lines().collect();
        let mut matches = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            let mut chars_before = 0;
            let mut last_end = 0;
            for found in self.regex.find_iter(line) {
                if found.is_empty() {
                    continue;
                }
                chars_before += line[last_end..found.start()].chars().count();
                last_end = found.start();

                let before_start = index.saturating_sub(self.context_lines);
                let after_end = (index + 1 + self.context_lines).min(lines.len());
                matches.push(SearchMatch {
                    file_path: path.to_string(),
                    line: index + 1,
                    column: chars_before + 1,
                    matched_text: found.as_str().to_string(),
                    lines_before: lines[before_start..index].iter().map(|l| l.to_string()).collect(),
                    lines_after: lines[index + 1..after_end].iter().map(|l| l.to_string()).collect(),
                });
            }
        }

        FileScan::Text(matches)
    }

    /// Search `paths` in order, loading each through `reader`.
    ///
    /// `on_progress` is called after every file. Files that fail to load are
    /// recorded in the stats and skipped.
    pub fn search<F>(
        &self,
        reader: &dyn ArchiveReader,
        paths: &[String],
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> SearchOutcome
    where
        F: FnMut(&SearchProgress),
    {
        let mut outcome = SearchOutcome::default();

        for (done, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(files_processed = done, "Search cancelled");
                outcome.cancelled = true;
                break;
            }

            match reader.read_entry(path) {
                Ok(content) => match self.search_file(path, &content) {
                    FileScan::Binary => {
                        tracing::debug!(path = %path, "Skipping binary file");
                        outcome.stats.files_skipped_binary += 1;
                    }
                    FileScan::Text(matches) => {
                        outcome.stats.files_scanned += 1;
                        if !matches.is_empty() {
                            outcome.stats.total_matches += matches.len();
                            outcome.results.push(FileSearchResult {
                                file_path: path.clone(),
                                matches,
                            });
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Skipping file that could not be read");
                    outcome.stats.files_failed.push(FailedFile {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            on_progress(&SearchProgress {
                files_processed: done + 1,
                total_files: paths.len(),
                current_file: path.clone(),
                matches_found: outcome.stats.total_matches,
            });
        }

        outcome
    }
}

/// Compile and run `query` over `paths` on the calling thread.
pub fn search<F>(
    reader: &dyn ArchiveReader,
    paths: &[String],
    query: &SearchQuery,
    cancel: &CancellationToken,
    on_progress: F,
) -> Result<SearchOutcome, SearchError>
where
    F: FnMut(&SearchProgress),
{
    let engine = SearchEngine::new(query)?;
    Ok(engine.search(reader, paths, cancel, on_progress))
}

/// Build the single matcher for a query.
///
/// An invalid regex is an error; it is never retried as a literal.
pub fn compile_query(query: &SearchQuery) -> Result<Regex, SearchError> {
    let body = if query.use_regex {
        query.pattern.clone()
    } else {
        regex::escape(&query.pattern)
    };
    let source = if query.whole_word {
        format!(r"\b(?:{body})\b")
    } else {
        body
    };

    RegexBuilder::new(&source)
        .case_insensitive(!query.case_sensitive)
        .build()
        .map_err(|e| SearchError::Pattern(e.to_string()))
}

/// Any NUL byte, or too few printable bytes in the leading sample.
pub fn is_binary(content: &[u8], sample_len: usize) -> bool {
    if content.contains(&0) {
        return true;
    }
    let sample = &content[..content.len().min(sample_len)];
    if sample.is_empty() {
        return false;
    }
    let printable = sample
        .iter()
        .filter(|&&b| matches!(b, b'\t' | b'\n' | b'\r' | 0x20..=0x7e | 0x80..=0xff))
        .count();
    printable * 100 < sample.len() * MIN_PRINTABLE_PERCENT
}
