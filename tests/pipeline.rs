//! End-to-end pipeline scenarios with mocked search, embedding and generation
//! and wiremock-served pages.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use webrag::config::{Config, FetchConfig};
use webrag::embed::{Embedder, EmbeddingGenerator};
use webrag::error::{Error, Result};
use webrag::fetch::ContentFetcher;
use webrag::pipeline::{AnswerOptions, Pipeline, RunState};
use webrag::search::{RawHit, SearchClient, SearchProvider};
use webrag::synth::{Generator, Prompt};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIM: usize = 26;

/// Returns fixed hits, or fails every call when `urls` is `None`
struct FixedSearch {
    urls: Option<Vec<String>>,
}

#[async_trait]
impl SearchProvider for FixedSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<RawHit>> {
        match &self.urls {
            Some(urls) => Ok(urls
                .iter()
                .enumerate()
                .map(|(i, url)| RawHit {
                    url: url.clone(),
                    title: format!("Result {}", i + 1),
                    snippet: String::new(),
                })
                .collect()),
            None => Err(Error::Other("connection refused".to_string())),
        }
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Never answers before the run deadline
struct StalledSearch;

#[async_trait]
impl SearchProvider for StalledSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<RawHit>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// Letter-frequency vectors: deterministic and roughly topical
struct LetterEmbedder {
    /// Queries equal to this text get a vector of the wrong size
    short_query: Option<String>,
}

fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
        v[(c as u8 - b'a') as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| match &self.short_query {
                Some(q) if q == t => vec![1.0; DIM / 2],
                _ => letter_vector(t),
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "letters"
    }
}

/// Answers "Paris" and remembers every prompt
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<Prompt>>,
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &Prompt, _model: Option<&str>) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if prompt.user.contains("[1]") {
            Ok("Paris is the capital of France [1].".to_string())
        } else {
            Ok("No web sources were found; from general knowledge, Paris.".to_string())
        }
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Takes longer than any deadline used here
struct SlowGenerator;

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(&self, _prompt: &Prompt, _model: Option<&str>) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("Too late.".to_string())
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

fn html_page(title: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{}</p>", p)).collect();
    format!(
        "<html><head><title>{}</title></head><body><nav>Home | About</nav><main>{}</main></body></html>",
        title, body
    )
}

fn pipeline(
    search: impl SearchProvider + 'static,
    embedder: LetterEmbedder,
    generator: Arc<dyn Generator>,
) -> Pipeline {
    let fetch_config = FetchConfig {
        attempts: 1,
        js_rendering: false,
        rate_limit_per_host: 100.0,
        ..FetchConfig::default()
    };

    Pipeline::new(
        Config::default(),
        SearchClient::new(Box::new(search), 1, Duration::ZERO),
        ContentFetcher::new(&fetch_config).unwrap(),
        EmbeddingGenerator::new(Arc::new(embedder), 8),
        generator,
    )
}

async fn mount_paris_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/paris"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            html_page(
                "Paris",
                &[
                    "Paris is the capital of France and its most populous city.",
                    "The city lies on the river Seine in the north of the country.",
                ],
            ),
            "text/html; charset=utf-8",
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/france"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            html_page(
                "France",
                &["France is a country in Western Europe. Paris is the capital of France."],
            ),
            "text/html; charset=utf-8",
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html_page("Slow", &["This page never arrives in time."]), "text/html")
                .set_delay(Duration::from_secs(4)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn answers_from_pages_that_loaded() {
    let server = MockServer::start().await;
    mount_paris_pages(&server).await;

    let ok_urls = vec![
        format!("{}/paris", server.uri()),
        format!("{}/france", server.uri()),
    ];
    let mut urls = ok_urls.clone();
    urls.push(format!("{}/slow", server.uri()));

    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(
        FixedSearch { urls: Some(urls) },
        LetterEmbedder { short_query: None },
        generator.clone(),
    );

    let options = AnswerOptions::new().with_fetch_timeout(Duration::from_secs(1));
    let report = pipeline.run("What is the capital of France?", &options).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.counters.pages_ok, 2);
    assert_eq!(report.counters.pages_failed, 1);
    assert!(report.counters.passages_indexed >= 2);
    assert!(report.degradations.iter().any(|d| {
        d.stage == RunState::Fetching && d.url.as_deref().unwrap_or("").ends_with("/slow")
    }));

    let answer = report.answer.expect("answer");
    assert!(answer.grounded);
    assert!(answer.text.contains("Paris"));
    assert!(!answer.cited_sources.is_empty());
    assert!(answer.cited_sources.iter().all(|url| ok_urls.contains(url)));

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(!prompts[0].user.contains("Home | About"));
}

#[tokio::test]
async fn all_fetches_failing_still_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let urls = (1..=3).map(|i| format!("{}/page-{}", server.uri(), i)).collect();
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(
        FixedSearch { urls: Some(urls) },
        LetterEmbedder { short_query: None },
        generator.clone(),
    );

    let report = pipeline
        .run("What is the capital of France?", &AnswerOptions::new())
        .await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.counters.pages_failed, 3);
    assert_eq!(report.counters.passages_indexed, 0);
    assert_eq!(report.counters.passages_retrieved, 0);
    assert_eq!(report.degradations.len(), 3);

    let answer = report.answer.expect("answer");
    assert!(!answer.grounded);
    assert!(answer.cited_sources.is_empty());
    assert!(generator.prompts.lock().unwrap()[0]
        .user
        .contains("No web sources"));
}

#[tokio::test]
async fn search_outage_degrades_to_ungrounded_answer() {
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(
        FixedSearch { urls: None },
        LetterEmbedder { short_query: None },
        generator,
    );

    let answer = pipeline
        .answer("What is the capital of France?", &AnswerOptions::new())
        .await
        .unwrap();
    assert!(!answer.grounded);
    assert!(answer.cited_sources.is_empty());
}

#[tokio::test]
async fn query_dimension_mismatch_fails_the_run() {
    let server = MockServer::start().await;
    mount_paris_pages(&server).await;

    let query = "What is the capital of France?";
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(
        FixedSearch {
            urls: Some(vec![format!("{}/paris", server.uri())]),
        },
        LetterEmbedder {
            short_query: Some(query.to_string()),
        },
        generator.clone(),
    );

    let report = pipeline.run(query, &AnswerOptions::new()).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failed_at, Some(RunState::Embedding));
    assert!(report.answer.is_none());
    assert!(matches!(
        report.error,
        Some(Error::EmbeddingDimensionMismatch {
            expected: DIM,
            actual: 13
        })
    ));
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tiny_context_budget_includes_no_passages() {
    let server = MockServer::start().await;
    mount_paris_pages(&server).await;

    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(
        FixedSearch {
            urls: Some(vec![format!("{}/paris", server.uri())]),
        },
        LetterEmbedder { short_query: None },
        generator,
    );

    let options = AnswerOptions::new().with_max_context_chars(10);
    let report = pipeline.run("capital of France", &options).await;

    assert_eq!(report.state, RunState::Completed);
    assert!(report.counters.passages_retrieved > 0);
    let answer = report.answer.expect("answer");
    assert!(!answer.grounded);
    assert!(answer.cited_sources.is_empty());
    assert!(answer.citations.is_empty());
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let pipeline = pipeline(
        FixedSearch { urls: Some(Vec::new()) },
        LetterEmbedder { short_query: None },
        Arc::new(RecordingGenerator::default()),
    );

    let report = pipeline.run("   ", &AnswerOptions::new()).await;
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failed_at, Some(RunState::Received));
    assert!(matches!(report.into_result(), Err(Error::InvalidQuery(_))));
}

#[tokio::test]
async fn embedding_model_override_must_match() {
    let pipeline = pipeline(
        FixedSearch { urls: Some(Vec::new()) },
        LetterEmbedder { short_query: None },
        Arc::new(RecordingGenerator::default()),
    );

    let options = AnswerOptions::new().with_embedding_model_id("BAAI/bge-base-en-v1.5");
    let err = pipeline
        .answer("capital of France", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn deadline_during_fetching_keeps_finished_pages() {
    let server = MockServer::start().await;
    mount_paris_pages(&server).await;

    let paris = format!("{}/paris", server.uri());
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(
        FixedSearch {
            urls: Some(vec![paris.clone(), format!("{}/slow", server.uri())]),
        },
        LetterEmbedder { short_query: None },
        generator.clone(),
    );

    let options = AnswerOptions::new()
        .with_deadline(Duration::from_millis(800))
        .with_fetch_timeout(Duration::from_secs(10));
    let report = pipeline.run("What is the capital of France?", &options).await;

    assert_eq!(report.state, RunState::Completed);
    assert!(report.error.is_none());
    assert_eq!(report.counters.pages_ok, 1);
    assert_eq!(report.counters.pages_failed, 1);
    assert!(report.degradations.iter().any(|d| {
        d.stage == RunState::Fetching && d.url.as_deref().unwrap_or("").ends_with("/slow")
    }));
    assert!(report.elapsed_ms < 4000);

    let answer = report.answer.expect("answer");
    assert!(answer.grounded);
    assert_eq!(answer.cited_sources, vec![paris]);
}

#[tokio::test]
async fn deadline_during_searching_degrades() {
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(
        StalledSearch,
        LetterEmbedder { short_query: None },
        generator.clone(),
    );

    let options = AnswerOptions::new().with_deadline(Duration::from_millis(400));
    let report = pipeline.run("What is the capital of France?", &options).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.counters.search_results, 0);
    assert_eq!(report.degradations.len(), 1);
    assert_eq!(report.degradations[0].stage, RunState::Searching);

    let answer = report.answer.expect("answer");
    assert!(!answer.grounded);
    assert_eq!(generator.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deadline_during_synthesis_fails_the_run() {
    let pipeline = pipeline(
        FixedSearch { urls: Some(Vec::new()) },
        LetterEmbedder { short_query: None },
        Arc::new(SlowGenerator),
    );

    let options = AnswerOptions::new().with_deadline(Duration::from_millis(500));
    let report = pipeline.run("What is the capital of France?", &options).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failed_at, Some(RunState::Synthesizing));
    assert!(report.answer.is_none());
    assert!(matches!(
        report.error,
        Some(Error::DeadlineExceeded(RunState::Synthesizing))
    ));
}

#[tokio::test]
async fn min_score_drops_weak_passages() {
    let server = MockServer::start().await;
    mount_paris_pages(&server).await;

    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(
        FixedSearch {
            urls: Some(vec![format!("{}/paris", server.uri())]),
        },
        LetterEmbedder { short_query: None },
        generator.clone(),
    );

    let options = AnswerOptions::new().with_min_score(0.999);
    let report = pipeline.run("capital of France", &options).await;

    assert_eq!(report.state, RunState::Completed);
    assert!(report.counters.passages_indexed > 0);
    assert_eq!(report.counters.passages_retrieved, 0);
    let answer = report.answer.expect("answer");
    assert!(!answer.grounded);
    assert!(generator.prompts.lock().unwrap()[0]
        .user
        .contains("No web sources"));
}
