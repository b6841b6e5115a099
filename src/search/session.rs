use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{SearchEngine, SearchError, SearchOutcome, SearchProgress, SearchQuery};
use crate::unpack::ArchiveReader;

/// Runs searches for one package on a background thread.
///
/// Submitting a new query cancels the one in flight. Each submission gets a
/// new id; callers compare it with [`SearchSession::is_current`] and drop
/// outcomes from superseded searches.
pub struct SearchSession {
    reader: Arc<dyn ArchiveReader>,
    paths: Arc<[String]>,
    binary_sample_len: usize,
    next_id: u64,
    current: Option<(u64, CancellationToken)>,
}

/// Handle to one submitted search.
pub struct SearchTicket {
    pub id: u64,
    pub progress: mpsc::UnboundedReceiver<SearchProgress>,
    cancel: CancellationToken,
    handle: JoinHandle<SearchOutcome>,
}

impl SearchTicket {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the search to finish (or stop, if cancelled).
    pub async fn outcome(self) -> Result<SearchOutcome, SearchError> {
        self.handle
            .await
            .map_err(|e| SearchError::Task(e.to_string()))
    }
}

impl SearchSession {
    pub fn new(reader: Arc<dyn ArchiveReader>, paths: Vec<String>) -> Self {
        Self {
            reader,
            paths: paths.into(),
            binary_sample_len: crate::config::DEFAULT_BINARY_SAMPLE_LEN,
            next_id: 1,
            current: None,
        }
    }

    /// Session over every file of `reader`, in archive order.
    pub fn for_all_files(reader: Arc<dyn ArchiveReader>) -> Self {
        let paths = reader.file_paths();
        Self::new(reader, paths)
    }

    pub fn with_binary_sample_len(mut self, len: usize) -> Self {
        self.binary_sample_len = len;
        self
    }

    /// Start a search, superseding any search still running.
    ///
    /// The pattern is compiled before anything is spawned, so a bad pattern
    /// is reported here, as is a call made outside a Tokio runtime.
    pub fn submit(&mut self, query: &SearchQuery) -> Result<SearchTicket, SearchError> {
        let engine = SearchEngine::new(query)?.with_binary_sample_len(self.binary_sample_len);
        let runtime = Handle::try_current().map_err(|e| SearchError::Task(e.to_string()))?;

        self.cancel();

        let id = self.next_id;
        self.next_id += 1;
        let cancel = CancellationToken::new();
        self.current = Some((id, cancel.clone()));

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = Arc::clone(&self.reader);
        let paths = Arc::clone(&self.paths);
        let token = cancel.clone();

        tracing::debug!(search_id = id, files = paths.len(), "Submitting search");
        let handle = runtime.spawn_blocking(move || {
            engine.search(reader.as_ref(), &paths, &token, |progress| {
                // The receiver may already be gone; progress is advisory.
                let _ = tx.send(progress.clone());
            })
        });

        Ok(SearchTicket {
            id,
            progress: rx,
            cancel,
            handle,
        })
    }

    /// Cancel the current search, if any.
    pub fn cancel(&mut self) {
        if let Some((id, token)) = self.current.take() {
            tracing::debug!(search_id = id, "Cancelling search");
            token.cancel();
        }
    }

    pub fn is_current(&self, id: u64) -> bool {
        matches!(&self.current, Some((current, _)) if *current == id)
    }

    /// Keep `outcome` only if it belongs to the newest search.
    pub fn accept(&self, id: u64, outcome: SearchOutcome) -> Option<SearchOutcome> {
        if self.is_current(id) {
            Some(outcome)
        } else {
            tracing::debug!(search_id = id, "Dropping stale search result");
            None
        }
    }
}
