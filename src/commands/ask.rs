//! Ask command implementation

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{AnswerOptions, Pipeline, RunReport};
use tracing::debug;

/// Answer a single question
pub async fn cmd_ask(config: &Config, query: &str, options: AnswerOptions) -> Result<RunReport> {
    let pipeline = Pipeline::from_config(config)?;
    debug!("Ask options: {:?}", options);

    let report = pipeline.run(query, &options).await;
    pipeline.shutdown().await;
    Ok(report)
}

/// Print an answer with its sources
pub fn print_answer(report: &RunReport) {
    let Some(answer) = &report.answer else {
        return;
    };

    println!("\n{}\n", answer.text);

    if answer.grounded {
        println!("Sources:");
        for (i, url) in answer.cited_sources.iter().enumerate() {
            let title = report
                .sources
                .iter()
                .find(|s| &s.url == url)
                .map(|s| s.title.as_str())
                .filter(|t| !t.is_empty());
            match title {
                Some(title) => println!("  [{}] {} - {}", i + 1, title, url),
                None => println!("  [{}] {}", i + 1, url),
            }
        }
    } else {
        println!("(No web sources were used for this answer.)");
    }

    if !report.degradations.is_empty() {
        println!("\nSkipped:");
        for d in &report.degradations {
            match &d.url {
                Some(url) => println!("  - {} ({})", url, d.message),
                None => println!("  - {}: {}", d.stage, d.message),
            }
        }
    }

    let c = &report.counters;
    println!(
        "\n{} results, {}/{} pages fetched, {} passages indexed, {} ms",
        c.search_results,
        c.pages_ok,
        c.pages_ok + c.pages_failed,
        c.passages_indexed,
        report.elapsed_ms
    );
}
