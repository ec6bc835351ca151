//! Safety policy for model-generated SQL.
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. statement must start with `SELECT` (leading whitespace/comments skipped)
//! 2. at most one statement (a single trailing `;` is fine)
//! 3. no denylisted keyword, marker or system accessor
//! 4. no `JOIN`
//! 5. no wildcard projection
//! 6. every table after `FROM`/`JOIN`, parenthesised or not, is on the
//!    allowlist
//!
//! The validator never rewrites the query; see [`crate::optimizer`] for that.

use crate::model::ValidationVerdict;
use regex::Regex;
use std::collections::BTreeSet;

pub const E_NOT_SELECT: &str = "E_NOT_SELECT";
pub const E_MULTI_STATEMENT: &str = "E_MULTI_STATEMENT";
pub const E_FORBIDDEN_PATTERN: &str = "E_FORBIDDEN_PATTERN";
pub const E_JOIN: &str = "E_JOIN";
pub const E_WILDCARD: &str = "E_WILDCARD";
pub const E_TABLE_NOT_ALLOWED: &str = "E_TABLE_NOT_ALLOWED";

/// Keywords rejected as whole words, so `created_at` does not trip `CREATE`.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DELETE", "DROP", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE", "MERGE", "EXEC",
    "EXECUTE", "UNION", "INTERSECT", "EXCEPT", "SLEEP", "BENCHMARK", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM", "GRANT", "REVOKE", "COPY",
];

/// (display name, pattern) pairs matched anywhere in the text.
const FORBIDDEN_PATTERNS: &[(&str, &str)] = &[
    ("--", r"--"),
    ("/*", r"/\*"),
    ("*/", r"\*/"),
    ("INTO OUTFILE", r"(?i)\bINTO\s+OUTFILE\b"),
    ("INTO DUMPFILE", r"(?i)\bINTO\s+DUMPFILE\b"),
    ("LOAD_FILE", r"(?i)LOAD_FILE"),
    ("INFORMATION_SCHEMA", r"(?i)INFORMATION_SCHEMA"),
    ("WAITFOR DELAY", r"(?i)\bWAITFOR\s+DELAY\b"),
    ("REPLACE INTO", r"(?i)\bREPLACE\s+INTO\b"),
    ("@@", r"@@"),
    ("pg_", r"(?i)\bpg_"),
    ("xp_", r"(?i)\bxp_"),
    ("sp_", r"(?i)\bsp_"),
    ("sqlite_", r"(?i)\bsqlite_"),
    ("pragma_", r"(?i)\bpragma_"),
    ("dbms_", r"(?i)\bdbms_"),
    ("utl_", r"(?i)\butl_"),
];

const IDENT: &str = r#"(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*)"#;

struct Forbidden {
    name: String,
    re: Regex,
}

pub struct SqlValidator {
    allowed_tables: BTreeSet<String>,
    forbidden: Vec<Forbidden>,
    join: Regex,
    wildcard: Regex,
    table_list: Regex,
    list_entry: Regex,
    ident: Regex,
    subquery: Regex,
}

impl SqlValidator {
    pub fn new<I, S>(allowed_tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut forbidden: Vec<Forbidden> = FORBIDDEN_KEYWORDS
            .iter()
            .map(|kw| Forbidden {
                name: kw.to_string(),
                re: compile(&format!(r"(?i)\b{}\b", kw)),
            })
            .collect();
        forbidden.extend(FORBIDDEN_PATTERNS.iter().map(|(name, pat)| Forbidden {
            name: name.to_string(),
            re: compile(pat),
        }));

        let qualified = format!(r"{IDENT}(?:\s*\.\s*{IDENT})*");
        // `(name)` is a legal table reference in SQLite
        let table_ref =
            format!(r"(?:\(\s*)*{qualified}(?:\s*\))*(?:\s+(?:AS\s+)?{IDENT})?");

        Self {
            allowed_tables: allowed_tables
                .into_iter()
                .map(|t| t.as_ref().trim().to_ascii_lowercase())
                .collect(),
            forbidden,
            join: compile(r"(?i)\bJOIN\b"),
            wildcard: compile(&format!(
                r#"(?i)(?:\bSELECT|\bDISTINCT|\bALL|,)\s*(?:{IDENT}\s*\.\s*)?\*"#
            )),
            table_list: compile(&format!(
                r"(?i)\b(?:FROM|JOIN)\b\s*({table_ref}(?:\s*,\s*{table_ref})*)"
            )),
            list_entry: compile(&format!(r"(?:^|,)[\s(]*({qualified})")),
            ident: compile(IDENT),
            subquery: compile(r"(?i)\(\s*SELECT\b"),
        }
    }

    pub fn allowed_tables(&self) -> impl Iterator<Item = &str> {
        self.allowed_tables.iter().map(|s| s.as_str())
    }

    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        if !starts_with_select(sql) {
            return ValidationVerdict::blocked(
                sql,
                E_NOT_SELECT,
                "Only SELECT queries are allowed".to_string(),
            );
        }

        let body = sql.trim_end();
        let body = body.strip_suffix(';').unwrap_or(body);
        if body.contains(';') {
            return ValidationVerdict::blocked(
                sql,
                E_MULTI_STATEMENT,
                "Multiple statements are not allowed".to_string(),
            );
        }

        if let Some(hit) = self.forbidden.iter().find(|f| f.re.is_match(sql)) {
            return ValidationVerdict::blocked(
                sql,
                E_FORBIDDEN_PATTERN,
                format!("SQL query contains forbidden pattern: {}", hit.name),
            );
        }

        if self.join.is_match(sql) {
            return ValidationVerdict::blocked(
                sql,
                E_JOIN,
                "JOIN operations are not permitted".to_string(),
            );
        }

        if self.wildcard.is_match(sql) {
            return ValidationVerdict::blocked(
                sql,
                E_WILDCARD,
                "Wildcard selects are not allowed; specify columns explicitly".to_string(),
            );
        }

        for table in self.referenced_tables(sql) {
            if !self.allowed_tables.contains(&table.to_ascii_lowercase()) {
                return ValidationVerdict::blocked(
                    sql,
                    E_TABLE_NOT_ALLOWED,
                    format!("Access to table '{}' is not allowed", table),
                );
            }
        }

        ValidationVerdict::allowed(sql)
    }

    /// Table names after `FROM`/`JOIN`, unquoted, in order of appearance.
    /// Regex based: names inside `EXTRACT(x FROM col)` are reported too.
    /// A derived table `FROM (SELECT ...)` contributes the tables of its own
    /// `FROM`, not a name.
    pub fn referenced_tables(&self, sql: &str) -> Vec<String> {
        // a masked derived table cannot start a table reference
        let sql = self.subquery.replace_all(sql, " ? ");
        let mut out = Vec::new();
        for list in self.table_list.captures_iter(&sql) {
            let list = &list[1];
            for entry in self.list_entry.captures_iter(list) {
                let parts: Vec<&str> = self
                    .ident
                    .find_iter(&entry[1])
                    .map(|m| unquote(m.as_str()))
                    .collect();
                out.push(parts.join("."));
            }
        }
        out
    }
}

fn compile(pattern: &str) -> Regex {
    // Patterns are compile-time constants; a failure here is a programming error.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

fn unquote(ident: &str) -> &str {
    let bytes = ident.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"')
            || (first == b'`' && last == b'`')
            || (first == b'[' && last == b']')
        {
            return &ident[1..ident.len() - 1];
        }
    }
    ident
}

fn skip_leading_trivia(sql: &str) -> &str {
    let mut s = sql.trim_start();
    loop {
        if let Some(rest) = s.strip_prefix("--") {
            s = rest.find('\n').map(|i| &rest[i + 1..]).unwrap_or("");
        } else if let Some(rest) = s.strip_prefix("/*") {
            s = rest.find("*/").map(|i| &rest[i + 2..]).unwrap_or("");
        } else {
            return s;
        }
        s = s.trim_start();
    }
}

fn starts_with_select(sql: &str) -> bool {
    let head: String = skip_leading_trivia(sql)
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    head.eq_ignore_ascii_case("SELECT")
}
