//! Default values for configuration

use super::{EmbeddingBackend, GenerationBackend, SearchProviderKind};

/// Normalize an `OLLAMA_HOST`-style value, which may omit the scheme
fn with_http_scheme(value: String) -> String {
    if value.contains("://") {
        value
    } else {
        format!("http://{}", value)
    }
}

/// Default Ollama URL for local inference
pub fn default_ollama_url() -> String {
    std::env::var("OLLAMA_HOST")
        .map(with_http_scheme)
        .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string())
}

/// Default search provider (no API key needed)
pub fn default_search_provider() -> SearchProviderKind {
    SearchProviderKind::DuckDuckGo
}

/// Default endpoint for the SearXNG provider
pub fn default_searxng_url() -> String {
    std::env::var("SEARXNG_URL").unwrap_or_else(|_| "http://127.0.0.1:8888".to_string())
}

/// Default endpoint for the DuckDuckGo HTML provider
pub fn default_duckduckgo_url() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

/// Default number of search results to fetch
pub fn default_search_max_results() -> usize {
    10
}

/// Default attempts per provider call
pub fn default_search_attempts() -> u32 {
    2
}

/// Default base backoff between search attempts (milliseconds)
pub fn default_search_backoff_ms() -> u64 {
    500
}

/// Default search request timeout in seconds
pub fn default_search_timeout() -> u64 {
    15
}

/// Default user agent
pub fn default_user_agent() -> String {
    format!(
        "Mozilla/5.0 (compatible; webrag/{}; +https://github.com/webrag/webrag)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Default page fetch timeout in seconds
pub fn default_fetch_timeout() -> u64 {
    15
}

/// Default number of simultaneous page fetches
pub fn default_fetch_concurrency() -> usize {
    5
}

/// Default attempts per URL
pub fn default_fetch_attempts() -> u32 {
    2
}

/// Default backoff between fetch attempts (milliseconds)
pub fn default_fetch_backoff_ms() -> u64 {
    300
}

/// Default requests per second per host
pub fn default_fetch_rate_limit() -> f64 {
    4.0
}

/// Visible text below this many chars triggers a rendered fetch
pub fn default_render_threshold_chars() -> usize {
    1000
}

/// Default: escalate to JS rendering when a page looks empty
pub fn default_js_rendering() -> bool {
    true
}

/// Default JS page load timeout (milliseconds)
pub fn default_js_page_load_timeout() -> u64 {
    30000
}

/// Default settle delay after load (milliseconds)
pub fn default_js_render_wait() -> u64 {
    2000
}

/// Default maximum characters per passage
pub fn default_max_passage_chars() -> usize {
    700
}

/// Default minimum characters per passage
pub fn default_min_passage_chars() -> usize {
    20
}

/// Default embedding backend
pub fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Local
}

/// Default embedding model (sentence-transformers/all-MiniLM-L6-v2)
pub fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

/// Default embedding dimension for all-MiniLM-L6-v2
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default embedding request timeout in seconds
pub fn default_embedding_timeout() -> u64 {
    30
}

/// Default retries for the HTTP embedding backend
pub fn default_embedding_retries() -> usize {
    2
}

/// Default generation backend
pub fn default_generation_backend() -> GenerationBackend {
    GenerationBackend::Ollama
}

/// Default generation model
pub fn default_generation_model() -> String {
    "llama3.2:1b".to_string()
}

/// Default environment variable holding the API key for OpenAI-compatible servers
pub fn default_generation_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default sampling temperature
pub fn default_temperature() -> f32 {
    0.7
}

/// Default nucleus sampling cutoff
pub fn default_top_p() -> f32 {
    0.9
}

/// Default maximum generated tokens
pub fn default_max_tokens() -> usize {
    512
}

/// Default generation request timeout in seconds
pub fn default_generation_timeout() -> u64 {
    120
}

/// Default attempts per generation request
pub fn default_generation_attempts() -> u32 {
    2
}

/// Default delay between generation attempts (milliseconds)
pub fn default_generation_retry_delay_ms() -> u64 {
    1000
}

/// Default number of passages retrieved for the prompt
pub fn default_top_k() -> usize {
    5
}

/// Default prompt context budget in characters
pub fn default_max_context_chars() -> usize {
    4000
}

/// Default cap on passages indexed per run
pub fn default_max_passages() -> usize {
    200
}

/// Default end-to-end deadline in seconds
pub fn default_deadline_secs() -> u64 {
    180
}

/// Default share of the deadline given to searching and fetching
pub fn default_gather_share() -> f64 {
    0.75
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_http_scheme() {
        assert_eq!(with_http_scheme("0.0.0.0:11434".to_string()), "http://0.0.0.0:11434");
        assert_eq!(
            with_http_scheme("https://ollama.internal".to_string()),
            "https://ollama.internal"
        );
    }
}
