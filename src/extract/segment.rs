//! Passage segmentation
//!
//! Paragraphs are split into sentences, and sentences are packed greedily
//! into passages of bounded length. Oversized sentences are split at word
//! boundaries, and oversized words at char boundaries, so no text is lost.

use unicode_segmentation::UnicodeSegmentation;

/// Split normalized text into passages of at most `max_chars` chars,
/// dropping passages shorter than `min_chars`.
pub fn segment(text: &str, max_chars: usize, min_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut passages = Vec::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
        if paragraph.is_empty() {
            continue;
        }
        pack_paragraph(&paragraph, max_chars, &mut passages);
    }

    passages.retain(|p| p.chars().count() >= min_chars);
    passages
}

fn pack_paragraph(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in paragraph.split_sentence_bounds() {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let len = sentence.chars().count();

        if len > max_chars {
            flush(&mut current, &mut current_len, out);
            out.extend(split_long(sentence, max_chars));
            continue;
        }

        let needed = if current.is_empty() { len } else { current_len + 1 + len };
        if needed > max_chars {
            flush(&mut current, &mut current_len, out);
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(sentence);
        current_len += len;
    }

    flush(&mut current, &mut current_len, out);
}

fn flush(current: &mut String, current_len: &mut usize, out: &mut Vec<String>) {
    if !current.is_empty() {
        out.push(std::mem::take(current));
    }
    *current_len = 0;
}

/// Split an oversized sentence at word boundaries
fn split_long(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in sentence.split_whitespace() {
        let len = word.chars().count();

        if len > max_chars {
            flush(&mut current, &mut current_len, &mut pieces);
            pieces.extend(split_chars(word, max_chars));
            continue;
        }

        let needed = if current.is_empty() { len } else { current_len + 1 + len };
        if needed > max_chars {
            flush(&mut current, &mut current_len, &mut pieces);
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += len;
    }

    flush(&mut current, &mut current_len, &mut pieces);
    pieces
}

/// Split an oversized word into char-boundary pieces
fn split_chars(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
