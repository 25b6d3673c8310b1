//! Hierarchical splitting of long answers into size-bounded chunks.
//!
//! Paragraphs (`\n\n`) are packed first; an oversized paragraph is broken
//! into sentences (`. `), and an oversized sentence into words. Lengths are
//! counted in `char`s. A single word over the limit becomes its own chunk.

const PARAGRAPH_SEP: &str = "\n\n";
const SENTENCE_SEP: &str = " ";
const WORD_SEP: &str = " ";

/// Split `text` into chunks of at most `limit` characters.
///
/// Text that already fits is returned untouched as a single chunk. Otherwise
/// every chunk is trimmed and non-empty.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if char_len(text) <= limit {
        return vec![text.to_string()];
    }

    let mut packer = Packer::new(limit);

    for paragraph in text.split(PARAGRAPH_SEP) {
        if char_len(paragraph) <= limit {
            packer.push(paragraph, PARAGRAPH_SEP);
            continue;
        }

        let mut sep = PARAGRAPH_SEP;
        for sentence in sentences(paragraph) {
            if char_len(&sentence) <= limit {
                packer.push(&sentence, sep);
            } else {
                let mut word_sep = sep;
                for word in sentence.split_whitespace() {
                    packer.push(word, word_sep);
                    word_sep = WORD_SEP;
                }
            }
            sep = SENTENCE_SEP;
        }
    }

    packer.finish()
}

/// Break a paragraph at `. `, keeping the period on each sentence.
fn sentences(paragraph: &str) -> Vec<String> {
    let pieces: Vec<&str> = paragraph.split(". ").collect();
    let last = pieces.len().saturating_sub(1);
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            if i < last {
                format!("{piece}.")
            } else {
                piece.to_string()
            }
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedy chunk builder: appends units until the next one would overflow.
struct Packer {
    limit: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    fn push(&mut self, piece: &str, sep: &str) {
        if piece.trim().is_empty() {
            return;
        }
        let piece_len = char_len(piece);

        if !self.current.is_empty() {
            if self.current_len + char_len(sep) + piece_len <= self.limit {
                self.current.push_str(sep);
                self.current.push_str(piece);
                self.current_len += char_len(sep) + piece_len;
                return;
            }
            self.flush();
        }

        self.current.push_str(piece);
        self.current_len = piece_len;
    }

    fn flush(&mut self) {
        let trimmed = self.current.trim();
        if !trimmed.is_empty() {
            self.chunks.push(trimmed.to_string());
        }
        self.current.clear();
        self.current_len = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn assert_valid(chunks: &[String], original: &str, limit: usize) {
        for chunk in chunks {
            assert!(!chunk.is_empty());
            assert!(char_len(chunk) <= limit, "chunk of {} > {limit}", char_len(chunk));
        }
        assert_eq!(squash(&chunks.join(" ")), squash(original));
    }

    #[test]
    fn short_text_is_one_untouched_chunk() {
        let text = "  Hello there.\n\nSecond paragraph.  ";
        assert_eq!(split_message(text, 4096), vec![text.to_string()]);
    }

    #[test]
    fn text_at_exact_limit_is_not_split() {
        let text = "a".repeat(50);
        assert_eq!(split_message(&text, 50), vec![text]);
    }

    #[test]
    fn packs_paragraphs_greedily() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        // "aaaa\n\nbbbb" is 10 chars; adding "\n\ncccc" would make 16.
        let chunks = split_message(text, 12);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn long_answer_with_paragraphs() {
        let paragraph = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let text = vec![paragraph.trim_end(); 10].join("\n\n");
        assert!(char_len(&text) > 8000);

        let chunks = split_message(&text, 4096);
        assert!(chunks.len() >= 2);
        assert_valid(&chunks, &text, 4096);
    }

    #[test]
    fn oversized_paragraph_splits_on_sentences() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let chunks = split_message(text, 25);
        assert_eq!(
            chunks,
            vec![
                "First sentence here.".to_string(),
                "Second sentence here.".to_string(),
                "Third sentence here.".to_string(),
            ]
        );
    }

    #[test]
    fn oversized_sentence_splits_on_words() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = split_message(text, 12);
        assert_valid(&chunks, text, 12);
        assert_eq!(chunks[0], "alpha beta");
    }

    #[test]
    fn oversized_word_is_emitted_verbatim() {
        let word = "x".repeat(30);
        let text = format!("short {word} tail");
        let chunks = split_message(&text, 10);
        assert_eq!(chunks, vec!["short".to_string(), word, "tail".to_string()]);
    }

    #[test]
    fn chunks_respect_limit_in_chars_not_bytes() {
        let text = "привет мир. ".repeat(100);
        let chunks = split_message(&text, 40);
        assert_valid(&chunks, &text, 40);
    }

    #[test]
    fn resplitting_is_idempotent() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            "Sentence number one. ".repeat(40),
            "y".repeat(120),
            "word ".repeat(300)
        );
        let chunks = split_message(&text, 100);
        let again: Vec<String> = chunks.iter().flat_map(|c| split_message(c, 100)).collect();
        assert_eq!(again, chunks);
    }

    #[test]
    fn whitespace_only_oversized_input_yields_nothing() {
        assert!(split_message(&" ".repeat(20), 10).is_empty());
    }

    #[test]
    fn blank_runs_do_not_create_empty_chunks() {
        let text = format!("{}\n\n\n\n\n\n{}", "a".repeat(8), "b".repeat(8));
        let chunks = split_message(&text, 10);
        assert_eq!(chunks, vec!["a".repeat(8), "b".repeat(8)]);
    }
}
