use std::collections::HashSet;

use serde::Serialize;

use crate::{
    index::RawHit,
    record::ResultItem,
    text_util::{self, contains_cjk},
};

/// Percentage of a CJK query's characters that must appear in the text.
pub const CJK_MIN_OVERLAP_PERCENT: usize = 60;

/// Containment test used to reject index false positives.
///
/// True when the lowercased `query` is a literal substring of the
/// lowercased `text`. For queries containing CJK, also true when at least
/// [`CJK_MIN_OVERLAP_PERCENT`] of the query's characters occur anywhere in the
/// text, in any order.
pub fn contains_term(text: &str, query: &str) -> bool {
    let text = text.to_lowercase();
    let query = query.to_lowercase();

    if text.contains(&query) {
        return true;
    }
    if !contains_cjk(&query) {
        return false;
    }

    let text_chars: HashSet<char> = text.chars().collect();
    let query_chars: Vec<char> = query.chars().collect();
    let present = query_chars
        .iter()
        .filter(|c| text_chars.contains(c))
        .count();

    present * 100 >= query_chars.len() * CJK_MIN_OVERLAP_PERCENT
}

/// Re-validate raw hits and shape them into result items.
///
/// A hit survives when the query is contained in its title or content.
/// Scores and order are passed through from the index.
pub fn filter_and_shape(hits: Vec<RawHit>, query: &str) -> Vec<ResultItem> {
    let query = query.trim();
    hits.into_iter()
        .filter_map(|hit| {
            let title_match = contains_term(&hit.title, query);
            let content_match = contains_term(&hit.content, query);
            (title_match || content_match).then(|| ResultItem {
                id: hit.id,
                title: hit.title,
                content: hit.content,
                score: hit.score,
                title_match,
                content_match,
                matched_terms: hit.terms,
            })
        })
        .collect()
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[ResultItem], query: &str) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, r) in results.iter().enumerate() {
        let field = match (r.title_match, r.content_match) {
            (true, true) => "title+content",
            (true, false) => "title",
            _ => "content",
        };
        println!("{:>3}. [{:.3}] {} ({field}) #{}", i + 1, r.score, r.title, r.id);
        if r.content_match
            && let Some(snippet) = text_util::extract_snippet(&r.content, query)
        {
            println!("     {snippet}");
        }
        if !r.matched_terms.is_empty() {
            println!("     terms: {}", r.matched_terms.join(", "));
        }
    }
    println!("\n{} result(s)", results.len());
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [ResultItem],
}

/// Format results as JSON output.
pub fn format_json(
    results: &[ResultItem],
    query: &str,
) -> serde_json::Result<String> {
    serde_json::to_string(&JsonOutput {
        query,
        result_count: results.len(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn hit(id: &str, title: &str, content: &str, score: f32) -> RawHit {
        RawHit {
            id: id.to_string(),
            score,
            terms: vec![],
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn literal_substring_is_case_insensitive() {
        assert!(contains_term("Quarterly Report", "quarterly"));
        assert!(contains_term("quarterly report", "REPORT"));
        assert!(!contains_term("Quarterly Report", "quarterlies"));
    }

    #[test]
    fn cjk_exact_substring() {
        assert!(contains_term("季度报告", "季度"));
    }

    #[test]
    fn cjk_scrambled_characters_pass_overlap_rule() {
        assert!(contains_term("季度报告完成", "度季报"));
    }

    #[test]
    fn cjk_overlap_threshold() {
        // 3 of 5 query chars present: exactly 60%
        assert!(contains_term("季度报", "季度报会议"));
        // 2 of 5: below threshold
        assert!(!contains_term("季度", "季度报会议"));
    }

    #[test]
    fn unrelated_query_rejected() {
        assert!(!contains_term("季度报告", "completely-unrelated"));
    }

    #[test]
    fn latin_queries_get_no_overlap_leniency() {
        assert!(!contains_term("report", "troper"));
    }

    #[test]
    fn filter_drops_false_positives_and_sets_flags() {
        let hits = vec![
            hit("a", "Quarterly Report", "revenue up", 3.0),
            hit("b", "Other", "the quarterly numbers", 2.0),
            hit("c", "Quartz", "minerals", 1.0),
        ];
        let results = filter_and_shape(hits, "quarterly");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].title_match);
        assert!(!results[0].content_match);
        assert_eq!(results[0].score, 3.0);
        assert_eq!(results[1].id, "b");
        assert!(!results[1].title_match);
        assert!(results[1].content_match);
    }

    #[test]
    fn filter_trims_query() {
        let results = filter_and_shape(
            vec![hit("a", "Hello World", "", 1.0)],
            "  hello ",
        );
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn json_output_shape() {
        let results =
            filter_and_shape(vec![hit("a", "Hello", "World", 1.5)], "hello");
        let json = format_json(&results, "hello").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["result_count"], 1);
        assert_eq!(value["results"][0]["id"], "a");
        assert_eq!(value["results"][0]["titleMatch"], true);
        assert_eq!(value["results"][0]["contentMatch"], false);
    }

    proptest! {
        #[test]
        fn substring_always_contained(
            prefix in "[a-zA-Z0-9 季度报告]{0,10}",
            needle in "[a-zA-Z0-9季度报告]{1,10}",
            suffix in "[a-zA-Z0-9 季度报告]{0,10}",
        ) {
            let text = format!("{prefix}{needle}{suffix}");
            prop_assert!(contains_term(&text, &needle));
        }
    }
}
