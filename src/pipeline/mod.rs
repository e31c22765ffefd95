//! Pipeline orchestration
//!
//! A run moves through search, fetch, extraction, embedding, indexing,
//! retrieval and synthesis. Search, fetch and extraction failures reduce the
//! number of sources; anything after that fails the run.

mod options;
mod state;

pub use options::*;
pub use state::*;

use crate::config::{Config, ExtractConfig};
use crate::embed::EmbeddingGenerator;
use crate::error::{Error, Result};
use crate::extract::{extract, Passage};
use crate::fetch::{ContentFetcher, FetchPlan, FetchedPage};
use crate::index::{EmbeddedPassage, ScoredEntry, VectorIndex};
use crate::search::{SearchClient, SearchResult};
use crate::synth::{create_generator, Answer, Generator, Synthesizer};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A non-fatal failure recorded during a run
#[derive(Debug, Clone, Serialize)]
pub struct Degradation {
    pub stage: RunState,
    /// Page the failure belongs to, if any
    pub url: Option<String>,
    pub message: String,
}

/// Per-run totals
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunCounters {
    pub search_results: usize,
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub passages_extracted: usize,
    pub duplicate_passages: usize,
    pub passages_indexed: usize,
    pub passages_retrieved: usize,
}

/// Outcome of one run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    pub state: RunState,
    /// Stage that aborted the run
    pub failed_at: Option<RunState>,
    pub degradations: Vec<Degradation>,
    pub counters: RunCounters,
    pub sources: Vec<SearchResult>,
    pub answer: Option<Answer>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<Error>,
}

fn serialize_error<S: Serializer>(
    error: &Option<Error>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl RunReport {
    fn new(run_id: Uuid, query: &str) -> Self {
        Self {
            run_id,
            query: query.to_string(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            state: RunState::Received,
            failed_at: None,
            degradations: Vec::new(),
            counters: RunCounters::default(),
            sources: Vec::new(),
            answer: None,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// The answer, or the error that failed the run
    pub fn into_result(self) -> Result<Answer> {
        match (self.answer, self.error) {
            (Some(answer), _) => Ok(answer),
            (None, Some(e)) => Err(e),
            (None, None) => Err(Error::Other(format!(
                "run {} ended in state {} without an answer",
                self.run_id, self.state
            ))),
        }
    }

    /// Record `error` as a degradation of `stage`, or hand it back when it
    /// is fatal there
    fn absorb(&mut self, stage: RunState, url: Option<&str>, error: Error) -> Result<()> {
        if error.is_fatal_in(stage) {
            return Err(error);
        }
        warn!("Degraded while {}: {}", stage, error);
        self.degradations.push(Degradation {
            stage,
            url: url.map(str::to_string),
            message: error.to_string(),
        });
        Ok(())
    }
}

/// Query-to-answer pipeline. Holds long-lived clients; every run builds its
/// own index.
pub struct Pipeline {
    config: Config,
    search: SearchClient,
    fetcher: ContentFetcher,
    embedder: EmbeddingGenerator,
    synthesizer: Synthesizer,
}

impl Pipeline {
    /// Assemble a pipeline from already constructed components
    pub fn new(
        config: Config,
        search: SearchClient,
        fetcher: ContentFetcher,
        embedder: EmbeddingGenerator,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            config,
            search,
            fetcher,
            embedder,
            synthesizer: Synthesizer::new(generator),
        }
    }

    /// Build every component from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let search = SearchClient::from_config(&config.search)?;
        let fetcher = ContentFetcher::new(&config.fetch)?;
        let embedder = EmbeddingGenerator::from_config(&config.embedding)?;
        let generator = create_generator(&config.generation)?;

        info!(
            "Pipeline ready: embedding model {} ({}d), generation model {}",
            embedder.model_id(),
            embedder.dimension(),
            generator.model_name()
        );
        Ok(Self::new(config.clone(), search, fetcher, embedder, generator))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Answer `query`, returning only the answer or the fatal error
    pub async fn answer(&self, query: &str, options: &AnswerOptions) -> Result<Answer> {
        self.run(query, options).await.into_result()
    }

    /// Run the full pipeline and report every stage
    pub async fn run(&self, query: &str, options: &AnswerOptions) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);

        async move {
            let start = Instant::now();
            let mut report = RunReport::new(run_id, query);
            let mut tracker = StateTracker::new();

            match self.execute(query, options, &mut tracker, &mut report).await {
                Ok(answer) => {
                    report.answer = Some(answer);
                    if let Err(e) = tracker.advance(RunState::Completed) {
                        report.error = Some(e);
                    }
                }
                Err(e) => {
                    let failed_at = tracker.fail();
                    warn!("Run failed while {}: {}", failed_at, e);
                    report.failed_at = Some(failed_at);
                    report.error = Some(e);
                }
            }

            report.state = tracker.current();
            report.elapsed_ms = start.elapsed().as_millis();
            info!(
                "Run {} in {} ms ({} degradations)",
                report.state,
                report.elapsed_ms,
                report.degradations.len()
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Close the headless browser, if one was started
    pub async fn shutdown(&self) {
        self.fetcher.close().await;
    }

    async fn execute(
        &self,
        query: &str,
        options: &AnswerOptions,
        tracker: &mut StateTracker,
        report: &mut RunReport,
    ) -> Result<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query is empty".to_string()));
        }

        let settings = options.resolve(&self.config);
        self.embedder
            .ensure_model(settings.embedding_model_id.as_deref())?;
        let started = Instant::now();
        let deadline = started + settings.deadline;
        // Searching and fetching stop here so later stages keep their share
        let gather_cutoff = started + settings.gather_budget();
        info!("Answering: {}", query);

        // Searching
        tracker.advance(RunState::Searching)?;
        let sources = match within(
            gather_cutoff,
            RunState::Searching,
            self.search.search(query, settings.max_results),
        )
        .await
        {
            Ok(results) => results,
            Err(e) => {
                report.absorb(RunState::Searching, None, e)?;
                Vec::new()
            }
        };
        report.counters.search_results = sources.len();
        report.sources = sources;

        // Fetching
        tracker.advance(RunState::Fetching)?;
        let urls: Vec<String> = report.sources.iter().map(|r| r.url.clone()).collect();
        let pages = if urls.is_empty() {
            Vec::new()
        } else {
            let plan = FetchPlan {
                concurrency: settings.fetch_concurrency,
                timeout: settings.fetch_timeout,
                deadline: gather_cutoff,
            };
            self.fetcher.fetch_all(&urls, &plan).await
        };
        for page in &pages {
            match page.error() {
                None => report.counters.pages_ok += 1,
                Some(e) => {
                    report.counters.pages_failed += 1;
                    report.absorb(RunState::Fetching, Some(&page.url), e)?;
                }
            }
        }
        info!(
            "Fetched {}/{} pages",
            report.counters.pages_ok,
            pages.len()
        );

        // Extracting
        tracker.advance(RunState::Extracting)?;
        let passages = collect_passages(
            &pages,
            &self.config.extract,
            settings.max_passages,
            report,
        )?;

        // Embedding
        tracker.advance(RunState::Embedding)?;
        let (embedded, query_vector) = if passages.is_empty() {
            info!("No passages to index");
            (Vec::new(), None)
        } else {
            let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
            let vectors = within(deadline, RunState::Embedding, self.embedder.embed(&texts)).await?;
            let query_vector =
                within(deadline, RunState::Embedding, self.embedder.embed_query(query)).await?;

            let embedded: Vec<EmbeddedPassage> = passages
                .into_iter()
                .zip(vectors)
                .map(|(passage, vector)| EmbeddedPassage { passage, vector })
                .collect();
            (embedded, Some(query_vector))
        };

        // Indexing
        tracker.advance(RunState::Indexing)?;
        if !embedded.is_empty() && Instant::now() >= deadline {
            return Err(Error::DeadlineExceeded(RunState::Indexing));
        }
        let mut index = VectorIndex::with_dimension(self.embedder.dimension());
        index.insert(embedded)?;
        report.counters.passages_indexed = index.len();

        // Retrieving
        tracker.advance(RunState::Retrieving)?;
        let mut retrieved: Vec<ScoredEntry> = match &query_vector {
            Some(vector) => index.query(vector, settings.top_k)?,
            None => Vec::new(),
        };
        if let Some(min_score) = settings.min_score {
            let before = retrieved.len();
            retrieved.retain(|entry| entry.score >= min_score);
            if retrieved.len() < before {
                debug!(
                    "Dropped {} passages scoring below {}",
                    before - retrieved.len(),
                    min_score
                );
            }
        }
        report.counters.passages_retrieved = retrieved.len();
        info!(
            "Retrieved {} of {} indexed passages",
            retrieved.len(),
            index.len()
        );

        // Synthesizing
        tracker.advance(RunState::Synthesizing)?;
        let answer = within(
            deadline,
            RunState::Synthesizing,
            self.synthesizer.synthesize(
                query,
                &retrieved,
                settings.max_context_chars,
                settings.generation_model_id.as_deref(),
            ),
        )
        .await?;

        Ok(answer)
    }
}

/// Await `fut`, failing with `DeadlineExceeded(stage)` at `deadline`
async fn within<T>(
    deadline: Instant,
    stage: RunState,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| Error::DeadlineExceeded(stage))?
}

/// Extract passages from pages in rank order, dropping passages already seen
/// on a higher-ranked page, and stop at `max_passages`
fn collect_passages(
    pages: &[FetchedPage],
    config: &ExtractConfig,
    max_passages: usize,
    report: &mut RunReport,
) -> Result<Vec<Passage>> {
    let mut seen = HashSet::new();
    let mut passages = Vec::new();

    for page in pages.iter().filter(|p| p.is_ok()) {
        let extracted = extract(page, config);
        if extracted.is_empty() {
            report.absorb(
                RunState::Extracting,
                Some(&page.url),
                Error::ExtractionEmpty(page.url.clone()),
            )?;
            continue;
        }
        report.counters.passages_extracted += extracted.len();

        for passage in extracted {
            if !seen.insert(passage.fingerprint()) {
                report.counters.duplicate_passages += 1;
                continue;
            }
            if passages.len() < max_passages {
                passages.push(passage);
            }
        }
    }

    if passages.len() == max_passages && report.counters.passages_extracted > max_passages {
        info!("Passage cap reached, keeping {}", max_passages);
    }
    Ok(passages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{MediaType, PageContentType};
    use std::time::Duration;

    fn page(url: &str, body: &str) -> FetchedPage {
        FetchedPage::ok(
            url,
            body.to_string(),
            PageContentType::Static,
            MediaType::PlainText,
            Duration::from_millis(5),
        )
    }

    fn extract_config() -> ExtractConfig {
        ExtractConfig {
            max_passage_chars: 80,
            min_passage_chars: 10,
        }
    }

    #[test]
    fn test_collect_passages_dedupes_across_pages() {
        let pages = vec![
            page("https://a.example", "Paris is the capital of France."),
            page(
                "https://b.example",
                "paris is  the capital of France.\n\nThe Seine flows through it.",
            ),
        ];
        let mut report = RunReport::new(Uuid::new_v4(), "q");
        let passages = collect_passages(&pages, &extract_config(), 10, &mut report).unwrap();

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source_url, "https://a.example");
        assert_eq!(passages[1].text, "The Seine flows through it.");
        assert_eq!(report.counters.duplicate_passages, 1);
    }

    #[test]
    fn test_collect_passages_cap_keeps_rank_order() {
        let pages = vec![
            page("https://a.example", "First page passage one.\n\nFirst page passage two."),
            page("https://b.example", "Second page passage one."),
        ];
        let mut report = RunReport::new(Uuid::new_v4(), "q");
        let passages = collect_passages(&pages, &extract_config(), 2, &mut report).unwrap();

        assert_eq!(passages.len(), 2);
        assert!(passages.iter().all(|p| p.source_url == "https://a.example"));
        assert_eq!(passages[1].position_index, 1);
    }

    #[test]
    fn test_empty_page_is_recorded() {
        let pages = vec![page("https://a.example", "tiny")];
        let mut report = RunReport::new(Uuid::new_v4(), "q");
        let passages = collect_passages(&pages, &extract_config(), 10, &mut report).unwrap();

        assert!(passages.is_empty());
        assert_eq!(report.degradations.len(), 1);
        assert_eq!(report.degradations[0].stage, RunState::Extracting);
    }

    #[test]
    fn test_absorb_degrades_only_recoverable_stages() {
        let mut report = RunReport::new(Uuid::new_v4(), "q");

        tokio_test::assert_ok!(report.absorb(
            RunState::Fetching,
            Some("https://a.example"),
            Error::DeadlineExceeded(RunState::Fetching),
        ));
        tokio_test::assert_ok!(report.absorb(
            RunState::Searching,
            None,
            Error::SearchUnavailable("dns".to_string()),
        ));
        assert_eq!(report.degradations.len(), 2);
        assert_eq!(report.degradations[0].url.as_deref(), Some("https://a.example"));

        let err = tokio_test::assert_err!(report.absorb(
            RunState::Embedding,
            None,
            Error::Embedding("backend down".to_string()),
        ));
        assert!(matches!(err, Error::Embedding(_)));
        assert_eq!(report.degradations.len(), 2);
    }

    #[test]
    fn test_report_serializes_error_as_message() {
        let mut report = RunReport::new(Uuid::new_v4(), "q");
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["error"].is_null());

        report.error = Some(Error::DeadlineExceeded(RunState::Synthesizing));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["error"], "Deadline exceeded while synthesizing");
        assert_eq!(json["state"], "received");
    }

    #[test]
    fn test_into_result_without_answer() {
        let mut report = RunReport::new(Uuid::new_v4(), "q");
        report.error = Some(Error::GenerationUnavailable("down".to_string()));
        assert!(matches!(
            report.into_result(),
            Err(Error::GenerationUnavailable(_))
        ));
    }
}
