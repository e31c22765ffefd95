//! Prompt construction

use crate::index::ScoredEntry;

/// System and user messages sent to the generation model
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const GROUNDED_SYSTEM: &str = "You are a careful research assistant. Answer the question using \
only the numbered sources provided. Cite the sources you use inline with their number in square \
brackets, for example [1] or [2][3]. Do not cite sources that are not listed. If the sources do \
not contain the answer, say that they do not.";

const UNGROUNDED_SYSTEM: &str = "You are a careful research assistant.";

const NO_SOURCES_NOTICE: &str = "No web sources could be retrieved for this question. Answer from \
your own knowledge, and state explicitly at the start of your answer that it is not based on \
retrieved web sources.";

/// One numbered source in the prompt
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBlock<'a> {
    pub marker: usize,
    pub url: &'a str,
    pub title: Option<&'a str>,
    /// Passages from this source, in page order
    pub passages: Vec<&'a ScoredEntry>,
}

/// Group selected passages by source. Markers follow the order in which each
/// source first appears in `selected`.
pub fn group_sources(selected: &[ScoredEntry]) -> Vec<SourceBlock<'_>> {
    let mut blocks: Vec<SourceBlock> = Vec::new();

    for entry in selected {
        let url = entry.passage.source_url.as_str();
        match blocks.iter_mut().find(|b| b.url == url) {
            Some(block) => block.passages.push(entry),
            None => blocks.push(SourceBlock {
                marker: blocks.len() + 1,
                url,
                title: entry.passage.source_title.as_deref(),
                passages: vec![entry],
            }),
        }
    }

    for block in &mut blocks {
        block.passages.sort_by_key(|e| e.passage.position_index);
    }
    blocks
}

/// Build the prompt for `query` over already grouped sources
pub fn build_prompt(query: &str, sources: &[SourceBlock]) -> Prompt {
    if sources.is_empty() {
        return Prompt {
            system: UNGROUNDED_SYSTEM.to_string(),
            user: format!("{}\n\nQuestion: {}\n\nAnswer:", NO_SOURCES_NOTICE, query.trim()),
        };
    }

    let mut user = String::from("Sources:\n");
    for source in sources {
        user.push('\n');
        match source.title {
            Some(title) => user.push_str(&format!(
                "[{}] {}\nURL: {}\n",
                source.marker, title, source.url
            )),
            None => user.push_str(&format!("[{}] {}\n", source.marker, source.url)),
        }
        for entry in &source.passages {
            user.push_str(&entry.passage.text);
            user.push('\n');
        }
    }
    user.push_str(&format!("\nQuestion: {}\n\nAnswer:", query.trim()));

    Prompt {
        system: GROUNDED_SYSTEM.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Passage;
    use crate::index::EntryId;

    fn entry(id: usize, url: &str, position: usize, text: &str, score: f32) -> ScoredEntry {
        ScoredEntry {
            id: EntryId(id),
            passage: Passage {
                source_url: url.to_string(),
                source_title: Some(format!("Title of {}", url)),
                text: text.to_string(),
                position_index: position,
            },
            score,
        }
    }

    #[test]
    fn test_same_source_shares_marker() {
        let selected = vec![
            entry(4, "https://a.example", 3, "A later passage.", 0.9),
            entry(7, "https://b.example", 0, "B passage.", 0.8),
            entry(1, "https://a.example", 0, "A first passage.", 0.7),
        ];
        let blocks = group_sources(&selected);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].marker, 1);
        assert_eq!(blocks[0].url, "https://a.example");
        assert_eq!(blocks[0].passages.len(), 2);
        assert_eq!(blocks[0].passages[0].passage.position_index, 0);
        assert_eq!(blocks[1].marker, 2);
    }

    #[test]
    fn test_prompt_lists_sources_then_question() {
        let selected = vec![
            entry(0, "https://a.example", 0, "Paris is the capital of France.", 0.9),
            entry(1, "https://b.example", 0, "France is in Europe.", 0.5),
        ];
        let prompt = build_prompt("What is the capital of France?", &group_sources(&selected));

        assert!(prompt.system.contains("[1]"));
        assert!(prompt.user.contains("[1] Title of https://a.example\nURL: https://a.example"));
        assert!(prompt.user.contains("[2] Title of https://b.example"));
        let source_pos = prompt.user.find("Paris is the capital").unwrap();
        let question_pos = prompt.user.find("Question: What is the capital").unwrap();
        assert!(source_pos < question_pos);
    }

    #[test]
    fn test_prompt_without_sources() {
        let prompt = build_prompt("What is the capital of France?", &[]);
        assert!(prompt.user.contains("No web sources"));
        assert!(prompt.user.contains("own knowledge"));
        assert!(!prompt.user.contains("[1]"));
    }
}
