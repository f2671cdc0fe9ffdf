//! DDL normalization for equality comparison.
//!
//! Canonicalizes raw DDL text so that two exports of the same object compare
//! equal: reserved keywords are upper-cased, ownership clauses and volatile
//! auto-increment counters are stripped, and whitespace is collapsed.
//!
//! Keyword folding runs through a minimal scanner that tracks quoted runs
//! (`'…'`, `"…"`, `` `…` ``) and comments (`--`, `#`, `/* */`), so literals
//! and quoted identifiers are never case-folded.

/// Reserved words upper-cased during normalization. Matched at word
/// boundaries in code regions only.
const KEYWORDS: &[&str] = &[
    "ACTION", "AFTER", "ALTER", "AND", "AS", "ASC", "AUTO_INCREMENT", "BEFORE", "BEGIN",
    "BETWEEN", "BIGINT", "BINARY", "BLOB", "BOOLEAN", "BY", "CASCADE", "CASE", "CHAR",
    "CHARACTER", "CHARSET", "COLLATE", "COLUMN", "COMMENT", "CONSTRAINT", "CREATE", "CURRENT_DATE",
    "CURRENT_TIMESTAMP", "CURRENT_USER", "DATE", "DATETIME", "DECIMAL", "DECLARE", "DEFAULT",
    "DEFINER", "DELETE", "DESC", "DETERMINISTIC", "DISTINCT", "DOUBLE", "DROP", "EACH", "ELSE",
    "ELSEIF", "END", "ENGINE", "ENUM", "EXISTS", "FLOAT", "FOR", "FOREIGN", "FROM", "FULLTEXT",
    "FUNCTION", "GROUP", "HAVING", "IF", "IN", "INDEX", "INSERT", "INT", "INTEGER", "INTO", "IS",
    "ITERATE", "JOIN", "JSON", "KEY", "LEAVE", "LEFT", "LIKE", "LIMIT", "LONGTEXT", "LOOP",
    "MEDIUMINT", "MEDIUMTEXT", "MODIFY", "NOT", "NULL", "ON", "OR", "ORDER", "OUT", "PRIMARY",
    "PROCEDURE", "READS", "REFERENCES", "REPEAT", "RESTRICT", "RETURN", "RETURNS", "RIGHT",
    "ROW", "SELECT", "SET", "SMALLINT", "SQL", "TABLE", "TEXT", "THEN", "TIME", "TIMESTAMP",
    "TINYINT", "TRIGGER", "UNIQUE", "UNSIGNED", "UPDATE", "USING", "VALUES", "VARCHAR", "WHEN",
    "WHERE", "WHILE", "ZEROFILL",
];

/// Normalize DDL text for equality comparison.
///
/// Never fails; empty or blank input yields an empty string. The pipeline is
/// order-sensitive: keywords, then definer clauses, then auto-increment
/// counters, then whitespace.
pub fn normalize(ddl: &str) -> String {
    if ddl.trim().is_empty() {
        return String::new();
    }
    let folded = uppercase_keywords(ddl);
    let owned = clean_definer(&folded);
    let stripped = strip_auto_increment(&owned);
    collapse_whitespace(&stripped)
}

/// Split a routine into header and body at the first standalone `BEGIN`.
///
/// Returns `None` when the text has no unquoted, word-boundary `BEGIN`.
pub fn split_routine(ddl: &str) -> Option<(String, String)> {
    let mask = code_mask(ddl);
    let (start, _) = find_word(ddl, &mask, "BEGIN", 0)?;
    Some((ddl[..start].to_string(), ddl[start..].to_string()))
}

/// Strip `DEFINER = <user>[@<host>]` ownership clauses.
///
/// For routines (anything with a standalone `BEGIN`) only the header is
/// rewritten, so literal "DEFINER" text inside the body survives. A no-op on
/// DDL carrying no ownership clause.
pub fn clean_definer(ddl: &str) -> String {
    match split_routine(ddl) {
        Some((header, body)) => {
            let mut cleaned = strip_definer_clauses(&header);
            cleaned.push_str(&body);
            cleaned
        }
        None => strip_definer_clauses(ddl),
    }
}

/// Strip volatile `AUTO_INCREMENT=<n>` table-option counters.
///
/// The bare column attribute (no `=`) is structural and survives.
pub fn strip_auto_increment(ddl: &str) -> String {
    let mut out = ddl.to_string();
    loop {
        let mask = code_mask(&out);
        let mut search = 0;
        let mut removed = false;
        while let Some((start, end)) = find_word(&out, &mask, "AUTO_INCREMENT", search) {
            if let Some(counter_end) = match_counter(&out, end) {
                out.replace_range(start..counter_end, " ");
                removed = true;
                break;
            }
            search = end;
        }
        if !removed {
            return out;
        }
    }
}

/// Collapse whitespace runs to single spaces and trim.
pub fn collapse_whitespace(ddl: &str) -> String {
    ddl.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Upper-case reserved keywords at word boundaries, leaving quoted runs and
/// comments untouched.
pub fn uppercase_keywords(ddl: &str) -> String {
    let mask = code_mask(ddl);
    let bytes = ddl.as_bytes();
    let mut out = String::with_capacity(ddl.len());
    let mut i = 0;
    while i < bytes.len() {
        if mask[i] && is_word_byte(bytes[i]) {
            let start = i;
            while i < bytes.len() && mask[i] && is_word_byte(bytes[i]) {
                i += 1;
            }
            let word = &ddl[start..i];
            let upper = word.to_uppercase();
            if KEYWORDS.contains(&upper.as_str()) {
                out.push_str(&upper);
            } else {
                out.push_str(word);
            }
        } else {
            // Copy one full char; multibyte chars are never word bytes.
            let ch = ddl[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

pub(crate) fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Per-byte mask: true for bytes outside quoted runs and comments.
pub(crate) fn code_mask(s: &str) -> Vec<bool> {
    #[derive(PartialEq)]
    enum State {
        Code,
        Single,
        Double,
        Backtick,
        LineComment,
        BlockComment,
    }

    let mut mask = vec![false; s.len()];
    let mut state = State::Code;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match state {
            State::Code => match b {
                b'\'' => state = State::Single,
                b'"' => state = State::Double,
                b'`' => state = State::Backtick,
                b'#' => state = State::LineComment,
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    i += 1;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    state = State::BlockComment;
                    i += 1;
                }
                _ => mask[i] = true,
            },
            State::Single | State::Double => {
                let quote = if state == State::Single { b'\'' } else { b'"' };
                if b == b'\\' {
                    i += 1;
                } else if b == quote {
                    // Doubled quote is an escaped quote, not a terminator.
                    if bytes.get(i + 1) == Some(&quote) {
                        i += 1;
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::Backtick => {
                if b == b'`' {
                    if bytes.get(i + 1) == Some(&b'`') {
                        i += 1;
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    i += 1;
                    state = State::Code;
                }
            }
        }
        i += 1;
    }
    mask
}

/// Case-insensitive word search restricted to code bytes.
pub(crate) fn find_word(s: &str, mask: &[bool], word: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    let target = word.as_bytes();
    let mut i = from;
    while i + target.len() <= bytes.len() {
        let candidate = &bytes[i..i + target.len()];
        let matches = candidate
            .iter()
            .zip(target)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
            && mask[i..i + target.len()].iter().all(|&m| m);
        if matches {
            let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let after = i + target.len();
            let after_ok = after >= bytes.len() || !is_word_byte(bytes[after]);
            if before_ok && after_ok {
                return Some((i, after));
            }
        }
        i += 1;
    }
    None
}

fn strip_definer_clauses(text: &str) -> String {
    let mut out = text.to_string();
    loop {
        let mask = code_mask(&out);
        let Some((start, word_end)) = find_word(&out, &mask, "DEFINER", 0) else {
            return out;
        };
        match match_definer_value(&out, word_end) {
            Some(end) => out.replace_range(start..end, " "),
            // A bare "DEFINER" word with no `= user` following it; leave it.
            None => return out,
        }
    }
}

/// Match `= <user>[@<host>]` after a DEFINER word; returns the end offset.
fn match_definer_value(s: &str, from: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = skip_spaces(bytes, from);
    if bytes.get(i) != Some(&b'=') {
        return None;
    }
    i = skip_spaces(bytes, i + 1);
    i = match_account_token(bytes, i)?;
    if bytes.get(i) == Some(&b'@') {
        i = match_account_token(bytes, i + 1)?;
    }
    Some(i)
}

/// A user or host token: quoted with `'`, `"` or `` ` ``, or bare
/// (alphanumerics, `_`, `%`, `.`, `-`).
fn match_account_token(bytes: &[u8], from: usize) -> Option<usize> {
    let quote = match bytes.get(from)? {
        q @ (b'\'' | b'"' | b'`') => Some(*q),
        _ => None,
    };
    if let Some(q) = quote {
        let mut i = from + 1;
        while i < bytes.len() {
            if bytes[i] == q {
                return Some(i + 1);
            }
            i += 1;
        }
        return None;
    }
    let mut i = from;
    while i < bytes.len()
        && (is_word_byte(bytes[i]) || bytes[i] == b'%' || bytes[i] == b'.' || bytes[i] == b'-')
    {
        i += 1;
    }
    if i == from { None } else { Some(i) }
}

/// Match `= <digits>` after an AUTO_INCREMENT word; returns the end offset.
fn match_counter(s: &str, from: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = skip_spaces(bytes, from);
    if bytes.get(i) != Some(&b'=') {
        return None;
    }
    i = skip_spaces(bytes, i + 1);
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start { None } else { Some(i) }
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t "), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "create table t (id int,\n  name varchar(50) default 'x')",
            "CREATE DEFINER=`root`@`localhost` PROCEDURE p() BEGIN SELECT 1; END",
            "create table c (n decimal(10,2)) engine=InnoDB auto_increment=991",
        ];
        for ddl in samples {
            let once = normalize(ddl);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_keyword_folding() {
        assert_eq!(
            normalize("create table orders (id int not null)"),
            "CREATE TABLE orders (id INT NOT NULL)"
        );
    }

    #[test]
    fn test_quoted_literal_survives_folding() {
        // "select" inside the literal and the backtick identifier must not fold.
        let ddl = "create table `select_log` (note varchar(20) default 'select me')";
        let out = normalize(ddl);
        assert!(out.contains("`select_log`"));
        assert!(out.contains("'select me'"));
        assert!(out.starts_with("CREATE TABLE"));
    }

    #[test]
    fn test_comment_survives_folding() {
        let out = uppercase_keywords("create table t (id int) -- create backup later\n");
        assert!(out.contains("-- create backup later"));
        assert!(out.starts_with("CREATE TABLE"));
    }

    #[test]
    fn test_definer_stripped_from_function_header_only() {
        let ddl = "CREATE DEFINER='root'@'%.example.com' FUNCTION f() RETURNS INT BEGIN RETURN 1; END";
        assert_eq!(
            normalize(ddl),
            "CREATE FUNCTION f() RETURNS INT BEGIN RETURN 1; END"
        );
    }

    #[test]
    fn test_definer_in_body_untouched() {
        let ddl = "CREATE PROCEDURE p() BEGIN SELECT 'DEFINER = nobody'; END";
        let out = clean_definer(ddl);
        assert_eq!(out, ddl);
    }

    #[test]
    fn test_clean_definer_noop_without_clause() {
        let ddl = "CREATE TABLE t (id INT)";
        assert_eq!(clean_definer(ddl), ddl);
    }

    #[test]
    fn test_definer_quoting_variants() {
        for ddl in [
            "CREATE DEFINER=`admin`@`10.0.%` VIEW v",
            "CREATE DEFINER=\"admin\"@\"%\" VIEW v",
            "CREATE DEFINER=admin@localhost VIEW v",
            "CREATE DEFINER = CURRENT_USER VIEW v",
        ] {
            let out = collapse_whitespace(&clean_definer(ddl));
            assert_eq!(out, "CREATE VIEW v", "failed on: {ddl}");
        }
    }

    #[test]
    fn test_auto_increment_counter_stripped() {
        let ddl =
            "CREATE TABLE t (id INT AUTO_INCREMENT, PRIMARY KEY (id)) ENGINE=InnoDB AUTO_INCREMENT=4021";
        let out = normalize(ddl);
        assert!(out.contains("id INT AUTO_INCREMENT"));
        assert!(!out.contains("AUTO_INCREMENT=4021"));
        assert!(!out.contains("4021"));
    }

    #[test]
    fn test_split_routine() {
        let ddl = "CREATE FUNCTION f() RETURNS INT BEGIN RETURN 1; END";
        let (header, body) = split_routine(ddl).unwrap();
        assert_eq!(header, "CREATE FUNCTION f() RETURNS INT ");
        assert_eq!(body, "BEGIN RETURN 1; END");
    }

    #[test]
    fn test_split_routine_no_begin() {
        assert_eq!(split_routine("CREATE TABLE t (id INT)"), None);
    }

    #[test]
    fn test_split_routine_ignores_quoted_begin() {
        let ddl = "CREATE FUNCTION f() RETURNS TEXT RETURN 'BEGIN'";
        assert_eq!(split_routine(ddl), None);
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(
            normalize("CREATE   TABLE\n\tt   (id INT)"),
            "CREATE TABLE t (id INT)"
        );
    }
}
