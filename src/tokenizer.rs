//! Tokenization shared by indexing and querying.
//!
//! Text is lowercased and split on whitespace and punctuation. Tokens that
//! contain CJK ideographs additionally yield overlapping character
//! bigrams and trigrams, so that substrings of an unsegmented CJK run can
//! be matched without a dictionary-based segmenter.

use tantivy::tokenizer::{Token, TokenStream, Tokenizer};

use crate::text_util::{contains_cjk, is_cjk_punctuation};

/// Name under which [`NgramTokenizer`] is registered with tantivy.
pub const TOKENIZER_NAME: &str = "cjk_ngram";

/// Tokens longer than this (in chars) get no n-grams.
pub const MAX_NGRAM_SOURCE_CHARS: usize = 50;

/// Trigrams are only produced for start positions below this bound.
pub const TRIGRAM_WINDOW: usize = 20;

/// Upper bound on n-grams emitted for a single basic token.
pub const MAX_NGRAMS_PER_TOKEN: usize = 30;

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation() || is_cjk_punctuation(c)
}

/// Split `text` into searchable tokens.
///
/// Deterministic and total: every input, including the empty string,
/// produces a (possibly empty) list with no empty entries.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();

    for basic in lowered.split(is_delimiter).filter(|t| !t.is_empty()) {
        tokens.push(basic.to_string());
        if contains_cjk(basic) {
            push_ngrams(basic, &mut tokens);
        }
    }

    tokens
}

fn push_ngrams(token: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > MAX_NGRAM_SOURCE_CHARS {
        return;
    }

    let mut emitted = 0;
    for i in 0..chars.len() {
        if i + 2 <= chars.len() {
            out.push(chars[i..i + 2].iter().collect());
            emitted += 1;
            if emitted >= MAX_NGRAMS_PER_TOKEN {
                return;
            }
        }
        if i < TRIGRAM_WINDOW && i + 3 <= chars.len() {
            out.push(chars[i..i + 3].iter().collect());
            emitted += 1;
            if emitted >= MAX_NGRAMS_PER_TOKEN {
                return;
            }
        }
    }
}

/// Adapter exposing [`tokenize`] to tantivy's analysis pipeline.
#[derive(Debug, Clone, Default)]
pub struct NgramTokenizer;

impl Tokenizer for NgramTokenizer {
    type TokenStream<'a> = NgramTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        let tokens = tokenize(text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Token {
                // Offsets are only used for highlighting, which happens
                // outside tantivy.
                offset_from: 0,
                offset_to: 0,
                position,
                text,
                position_length: 1,
            })
            .collect();
        NgramTokenStream { tokens, index: 0 }
    }
}

pub struct NgramTokenStream {
    tokens: Vec<Token>,
    index: usize,
}

impl TokenStream for NgramTokenStream {
    fn advance(&mut self) -> bool {
        if self.index < self.tokens.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.index - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.index - 1]
    }
}
