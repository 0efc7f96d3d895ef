//! Lightweight structural checks on query text
//!
//! No SQL parsing happens here: only placeholder counting, keyword-prefix
//! classification and execution-id shape matching.

use regex::Regex;
use std::sync::OnceLock;

// Execution ids are UUIDs
static EXECUTION_ID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn execution_id_pattern() -> &'static Regex {
    EXECUTION_ID_PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .unwrap()
    })
}

const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "WITH", "VALUES"];

/// Whether `query` looks like an execution id rather than SQL
pub fn is_execution_id(query: &str) -> bool {
    execution_id_pattern().is_match(query.trim())
}

/// Non-empty after trimming whitespace
pub fn is_query_valid(query: &str) -> bool {
    !query.trim().is_empty()
}

pub fn placeholder_count(query: &str) -> usize {
    query.bytes().filter(|b| *b == b'?').count()
}

/// Keyword-prefix check, case-insensitive, ignoring leading whitespace and
/// opening parentheses and leading comments
pub fn is_read_only_statement(query: &str) -> bool {
    let trimmed = skip_leading_noise(query);
    let keyword: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    READ_ONLY_KEYWORDS.contains(&keyword.as_str())
}

/// Strip whitespace, opening parentheses, `-- line` and `/* block */` comments
fn skip_leading_noise(query: &str) -> &str {
    let mut rest = query;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |pos| &comment[pos + 1..]);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            // An unterminated block comment hides the whole statement
            rest = comment.find("*/").map_or("", |pos| &comment[pos + 2..]);
        } else {
            return rest;
        }
    }
}
