//! Token counting, trimming and chunking.
//!
//! Backed by `tiktoken-rs`. Encoders are built lazily per model name and
//! cached for the life of the process; models tiktoken does not know fall
//! back to `cl100k_base`.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::Regex;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model};

use crate::error::{CallwiseError, Result};
use crate::log::{LogKind, log};

static ENCODERS: LazyLock<Mutex<HashMap<String, Arc<CoreBPE>>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

static SENTENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("valid regex"));

/// A BPE encoder bound to one model.
#[derive(Clone)]
pub struct Tokenizer {
    bpe: Arc<CoreBPE>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// The encoder for `model`, built on first use.
    ///
    /// # Errors
    /// Returns `CallwiseError::Tokenizer` if not even the fallback encoding loads.
    pub fn for_model(model: &str) -> Result<Self> {
        let mut encoders = ENCODERS.lock();
        if let Some(bpe) = encoders.get(model) {
            return Ok(Self { bpe: Arc::clone(bpe) });
        }

        let bpe = match get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => cl100k_base().map_err(|e| CallwiseError::Tokenizer(e.to_string()))?,
        };
        let bpe = Arc::new(bpe);
        encoders.insert(model.to_string(), Arc::clone(&bpe));
        Ok(Self { bpe })
    }

    /// Token ids of `text`.
    #[must_use]
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_with_special_tokens(text)
    }

    /// Number of tokens in `text`.
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Text for a token slice.
    ///
    /// # Errors
    /// Returns `CallwiseError::Tokenizer` if the slice cuts through a
    /// multi-byte character.
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|e| CallwiseError::Tokenizer(e.to_string()))
    }

    /// Keep the first (`preserve_top`) or last `max_tokens` tokens of `text`.
    ///
    /// Text already within budget comes back unchanged. A cut that would split
    /// a multi-byte character is moved inward, so the result may hold fewer
    /// than `max_tokens` tokens.
    #[must_use]
    pub fn trim(&self, text: &str, max_tokens: usize, preserve_top: bool) -> String {
        let tokens = self.encode(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        log(
            LogKind::Warning,
            true,
            format!("trimming prompt from {} to {max_tokens} tokens", tokens.len()),
        );

        // Move the cut inward until it no longer splits a multi-byte character.
        if preserve_top {
            let mut end = max_tokens;
            while end > 0 {
                if let Ok(text) = self.decode(&tokens[..end]) {
                    return text;
                }
                end -= 1;
            }
        } else {
            let mut start = tokens.len() - max_tokens;
            while start < tokens.len() {
                if let Ok(text) = self.decode(&tokens[start..]) {
                    return text;
                }
                start += 1;
            }
        }
        String::new()
    }

    /// Split `text` into chunks of at most `chunk_length` tokens.
    ///
    /// Sentences (ending in `.`, `!` or `?` followed by whitespace) are packed
    /// greedily; a sentence longer than the budget is cut on token windows.
    /// Empty chunks are never produced.
    ///
    /// # Errors
    /// Returns `CallwiseError::Tokenizer` if `chunk_length` is zero.
    pub fn chunk(&self, text: &str, chunk_length: usize) -> Result<Vec<String>> {
        if chunk_length == 0 {
            return Err(CallwiseError::Tokenizer("chunk length must be positive".into()));
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in split_sentences(text) {
            let candidate = if current.is_empty() {
                sentence.to_string()
            } else {
                format!("{current} {sentence}")
            };
            if self.count(&candidate) <= chunk_length {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if self.count(sentence) <= chunk_length {
                current = sentence.to_string();
            } else {
                let mut windows = self.token_windows(sentence, chunk_length);
                current = windows.pop().unwrap_or_default();
                chunks.extend(windows);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        Ok(chunks)
    }

    /// Cut `text` into consecutive windows of at most `size` tokens.
    ///
    /// A window is shortened when its end splits a multi-byte character. When
    /// a single character needs more than `size` tokens, its window grows just
    /// enough to hold it.
    fn token_windows(&self, text: &str, size: usize) -> Vec<String> {
        let tokens = self.encode(text);
        let mut windows = Vec::new();
        let mut start = 0;

        while start < tokens.len() {
            let mut end = (start + size).min(tokens.len());
            let piece = loop {
                if let Ok(piece) = self.decode(&tokens[start..end]) {
                    break Some(piece);
                }
                if end > start + 1 {
                    end -= 1;
                } else {
                    break None;
                }
            };
            let piece = match piece {
                Some(piece) => piece,
                None => {
                    end = start + size;
                    loop {
                        end += 1;
                        if end >= tokens.len() {
                            end = tokens.len();
                            break self.decode(&tokens[start..end]).unwrap_or_default();
                        }
                        if let Ok(piece) = self.decode(&tokens[start..end]) {
                            break piece;
                        }
                    }
                }
            };

            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                // Dropping a leading space can change how the text tokenizes.
                let window = if self.count(trimmed) <= size { trimmed } else { piece.as_str() };
                windows.push(window.to_string());
            }
            start = end;
        }
        windows
    }
}

/// Split on `.`, `!` or `?` followed by whitespace, keeping the punctuation.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        let sentence = text[start..=m.start()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Number of tokens `text` encodes to under `model`.
///
/// # Errors
/// Returns `CallwiseError::Tokenizer` if no encoder can be loaded.
pub fn count_tokens(text: &str, model: &str) -> Result<usize> {
    Ok(Tokenizer::for_model(model)?.count(text))
}

/// Token ids of `text` under `model`.
///
/// # Errors
/// Returns `CallwiseError::Tokenizer` if no encoder can be loaded.
pub fn get_tokens(text: &str, model: &str) -> Result<Vec<u32>> {
    Ok(Tokenizer::for_model(model)?.encode(text))
}

/// See [`Tokenizer::trim`].
///
/// # Errors
/// Returns `CallwiseError::Tokenizer` if no encoder can be loaded.
pub fn trim_prompt(text: &str, max_tokens: usize, model: &str, preserve_top: bool) -> Result<String> {
    Ok(Tokenizer::for_model(model)?.trim(text, max_tokens, preserve_top))
}

/// See [`Tokenizer::chunk`].
///
/// # Errors
/// Returns `CallwiseError::Tokenizer` if no encoder can be loaded or
/// `chunk_length` is zero.
pub fn chunk_prompt(text: &str, chunk_length: usize, model: &str) -> Result<Vec<String>> {
    Tokenizer::for_model(model)?.chunk(text, chunk_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "gpt-3.5-turbo-0613";

    #[test]
    fn counts_a_short_prompt() {
        assert_eq!(get_tokens("Write a song about AI", MODEL).expect("encode").len(), 5);
        assert_eq!(count_tokens("Write a song about AI", MODEL).expect("count"), 5);
    }

    #[test]
    fn unknown_model_falls_back() {
        let known = count_tokens("hello there, towel", MODEL).expect("count");
        let fallback = count_tokens("hello there, towel", "definitely-not-a-model").expect("count");
        assert_eq!(known, fallback);
    }

    #[test]
    fn trim_keeps_top_tokens() {
        let trimmed = trim_prompt("Write a song about AI", 2, MODEL, true).expect("trim");
        assert_eq!(trimmed, "Write a");
        assert_eq!(count_tokens(&trimmed, MODEL).expect("count"), 2);
    }

    #[test]
    fn trim_keeps_bottom_tokens() {
        let trimmed = trim_prompt("Write a song about AI", 2, MODEL, false).expect("trim");
        assert_eq!(trimmed, " about AI");
    }

    #[test]
    fn trim_never_splits_multibyte_characters() {
        let text = "🤖🤖🤖🤖 robots 你好世界";
        let total = count_tokens(text, MODEL).expect("count");
        for max_tokens in 1..total {
            for preserve_top in [true, false] {
                let trimmed = trim_prompt(text, max_tokens, MODEL, preserve_top).expect("trim");
                if preserve_top {
                    assert!(text.starts_with(&trimmed), "{trimmed:?} is not a prefix");
                } else {
                    assert!(text.ends_with(&trimmed), "{trimmed:?} is not a suffix");
                }
            }
        }
    }

    #[test]
    fn trim_within_budget_is_identity() {
        let text = "Write a song about AI";
        assert_eq!(trim_prompt(text, 50, MODEL, true).expect("trim"), text);
    }

    #[test]
    fn chunk_respects_budget_and_preserves_words() {
        let text = "Write a song about AI";
        let chunks = chunk_prompt(text, 2, MODEL).expect("chunk");
        assert_eq!(chunks, ["Write a", "song about", "AI"]);
        for chunk in &chunks {
            assert!(count_tokens(chunk, MODEL).expect("count") <= 2);
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn chunk_packs_sentences() {
        let text = "One. Two! Three? Four.";
        let chunks = chunk_prompt(text, 100, MODEL).expect("chunk");
        assert_eq!(chunks, [text]);
    }

    #[test]
    fn chunk_splits_on_sentence_boundaries() {
        let text = "The towel is dry. The towel is wet. The towel is gone.";
        let chunks = chunk_prompt(text, 6, MODEL).expect("chunk");
        assert_eq!(chunks, ["The towel is dry.", "The towel is wet.", "The towel is gone."]);
    }

    #[test]
    fn chunk_never_emits_empty_chunks() {
        assert!(chunk_prompt("", 10, MODEL).expect("chunk").is_empty());
        assert!(chunk_prompt("   \n ", 10, MODEL).expect("chunk").is_empty());
    }

    #[test]
    fn zero_chunk_length_is_an_error() {
        assert!(chunk_prompt("anything", 0, MODEL).is_err());
    }

    #[test]
    fn sentence_split_keeps_punctuation() {
        assert_eq!(split_sentences("Hi. How are you?  Fine!"), ["Hi.", "How are you?", "Fine!"]);
        assert_eq!(split_sentences("v1.2 is out"), ["v1.2 is out"]);
    }
}
