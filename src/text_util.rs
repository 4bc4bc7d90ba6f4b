/// Number of characters kept on each side of a match in a snippet.
pub const SNIPPET_CONTEXT_CHARS: usize = 60;

/// Maximum number of characters in a snippet before truncation.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// True for CJK unified ideographs (base block, extension A and the
/// compatibility block).
pub fn is_cjk(c: char) -> bool {
    matches!(
        c,
        '\u{4e00}'..='\u{9fff}'
            | '\u{3400}'..='\u{4dbf}'
            | '\u{f900}'..='\u{faff}'
    )
}

/// Check whether `text` contains at least one CJK ideograph.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Punctuation used by CJK text that `char::is_ascii_punctuation` misses.
pub fn is_cjk_punctuation(c: char) -> bool {
    matches!(
        c,
        '，' | '。'
            | '！'
            | '？'
            | '；'
            | '：'
            | '、'
            | '“'
            | '”'
            | '‘'
            | '’'
            | '（'
            | '）'
            | '【'
            | '】'
            | '《'
            | '》'
            | '「'
            | '」'
            | '…'
            | '·'
    )
}

/// Extract a single-line snippet around the first case-insensitive
/// occurrence of `query` in `text`.
///
/// Falls back to the head of the text when the query does not occur
/// literally (for example when a CJK hit matched on scattered characters).
/// Returns `None` for blank text.
pub fn extract_snippet(text: &str, query: &str) -> Option<String> {
    let chars: Vec<char> = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if chars.iter().all(|c| *c == ' ') {
        return None;
    }

    let start = find_chars(&chars, query)
        .map(|pos| pos.saturating_sub(SNIPPET_CONTEXT_CHARS))
        .unwrap_or(0);
    let end = (start + SNIPPET_MAX_CHARS).min(chars.len());

    let mut snippet: String = chars[start..end].iter().collect();
    snippet = snippet.trim().to_string();
    if start > 0 {
        snippet.insert_str(0, "...");
    }
    if end < chars.len() {
        snippet.push_str("...");
    }
    Some(snippet)
}

/// Char index of the first case-insensitive occurrence of `needle`.
fn find_chars(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.trim().to_lowercase().chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let lowered: Vec<char> = haystack
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();
    lowered.windows(needle.len()).position(|w| w == needle.as_slice())
}
