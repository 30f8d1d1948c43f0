//! A search session in which each new query supersedes the previous one.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::ranker::{HybridRanker, RankedResult, SourceFile};

/// Results of one completed search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    /// Increases with every search started in the session.
    pub generation: u64,
    pub query: String,
    pub results: Vec<RankedResult>,
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

/// Runs searches so that only the most recent one publishes results.
///
/// Starting a search cancels the one in flight; the cancelled call returns
/// [`SearchError::Superseded`] and its results are never published.
pub struct SearchSession {
    ranker: Arc<HybridRanker>,
    in_flight: Mutex<InFlight>,
    latest: watch::Sender<Option<Arc<SearchResults>>>,
}

impl SearchSession {
    pub fn new(ranker: Arc<HybridRanker>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            ranker,
            in_flight: Mutex::new(InFlight {
                generation: 0,
                cancel: CancellationToken::new(),
            }),
            latest,
        }
    }

    /// Watch the published results.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<SearchResults>>> {
        self.latest.subscribe()
    }

    /// The most recently published results.
    pub fn latest(&self) -> Option<Arc<SearchResults>> {
        self.latest.borrow().clone()
    }

    /// Cancel the search in flight, if any.
    pub async fn cancel(&self) {
        self.in_flight.lock().await.cancel.cancel();
    }

    /// Run a search, superseding any search in flight.
    pub async fn search(&self, query: &str, files: &[SourceFile]) -> Result<Arc<SearchResults>> {
        let (generation, cancel) = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.cancel.cancel();
            in_flight.generation += 1;
            in_flight.cancel = CancellationToken::new();
            (in_flight.generation, in_flight.cancel.clone())
        };
        debug!("Search {generation} started for {query:?}");

        let results = self.ranker.rank_cancellable(query, files, &cancel).await?;

        let in_flight = self.in_flight.lock().await;
        if in_flight.generation != generation {
            debug!("Search {generation} finished after being superseded");
            return Err(SearchError::Superseded);
        }
        let published = Arc::new(SearchResults {
            generation,
            query: query.to_string(),
            results,
        });
        self.latest.send_replace(Some(Arc::clone(&published)));
        Ok(published)
    }
}
