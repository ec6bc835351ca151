//! Bounds an already-validated query. Performs no safety checks.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// A query ready for the storage engine, with the guards it must run under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedQuery {
    pub sql: String,
    pub row_limit: u32,
    pub timeout: Duration,
}

impl OptimizedQuery {
    pub fn new(validated_sql: &str, max_rows: u32, timeout: Duration) -> Self {
        let (sql, row_limit) = bound(validated_sql, max_rows);
        Self {
            sql,
            row_limit,
            timeout,
        }
    }
}

/// The statement's own `LIMIT` clause: where it starts, its row count when
/// that is a literal, and the offset expression if any.
struct Limit<'a> {
    start: usize,
    count: Option<i64>,
    offset: Option<&'a str>,
}

fn keyword(word: &'static str) -> &'static Regex {
    static LIMIT: OnceLock<Regex> = OnceLock::new();
    static OFFSET: OnceLock<Regex> = OnceLock::new();
    let cell = if word == "LIMIT" { &LIMIT } else { &OFFSET };
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b{word}\b"))
            .unwrap_or_else(|e| panic!("invalid keyword pattern: {e}"))
    })
}

/// Byte offsets of `sql` that sit outside parentheses and quotes.
fn top_level(sql: &str) -> Vec<bool> {
    let mut out = vec![false; sql.len()];
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => out[i] = depth == 0,
            },
        }
    }
    out
}

/// Integer literal, possibly parenthesised: `10`, `(10)`, `-1`.
fn literal(expr: &str) -> Option<i64> {
    let mut e = expr.trim();
    while let Some(inner) = e.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        e = inner.trim();
    }
    e.parse().ok()
}

fn trailing_limit(sql: &str) -> Option<Limit<'_>> {
    let outer = top_level(sql);

    // LIMIT is the last clause of a SELECT, so the last top-level one is ours
    let kw = keyword("LIMIT")
        .find_iter(sql)
        .filter(|m| outer[m.start()])
        .last()?;
    let tail = sql[kw.end()..].trim_end();
    let tail = tail.strip_suffix(';').unwrap_or(tail);
    let tail_start = kw.end();

    let offset_kw = keyword("OFFSET")
        .find_iter(tail)
        .find(|m| outer[tail_start + m.start()]);
    let comma = tail
        .char_indices()
        .find(|&(i, c)| c == ',' && outer[tail_start + i])
        .map(|(i, _)| i);

    let (count, offset) = match (offset_kw, comma) {
        (Some(m), _) => (&tail[..m.start()], Some(tail[m.end()..].trim())),
        // SQLite `LIMIT offset, count`
        (None, Some(i)) => (&tail[i + 1..], Some(tail[..i].trim())),
        (None, None) => (tail, None),
    };
    Some(Limit {
        start: kw.start(),
        count: literal(count),
        offset: offset.filter(|o| !o.is_empty()),
    })
}

/// Rewritten statement and the row cap it now carries.
fn bound(sql: &str, max_rows: u32) -> (String, u32) {
    let existing = trailing_limit(sql);
    let head = match &existing {
        Some(l) => &sql[..l.start],
        None => sql,
    };
    let head = head.trim_end().trim_end_matches(';').trim_end();

    // a negative count means "no limit"; any non-literal expression is replaced
    let limit = match existing.as_ref().and_then(|l| l.count) {
        Some(n) if n >= 0 => u32::try_from(n).unwrap_or(u32::MAX).min(max_rows),
        _ => max_rows,
    };

    let sql = match existing.and_then(|l| l.offset) {
        Some(offset) => format!("{head} LIMIT {limit} OFFSET {offset};"),
        None => format!("{head} LIMIT {limit};"),
    };
    (sql, limit)
}

/// Replaces the outer `LIMIT` with `LIMIT min(existing, max_rows)`, keeps any
/// `OFFSET`, and terminates the statement with a single `;`.
pub fn optimize(sql: &str, max_rows: u32) -> String {
    bound(sql, max_rows).0
}
