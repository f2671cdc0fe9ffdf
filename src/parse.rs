//! Structural DDL parsers.
//!
//! Extracts typed shapes from CREATE statements for the fields the diff
//! engine must compare structurally instead of by text equality. Both
//! parsers are best-effort: unparseable input yields a partial or empty
//! structure, never an error. This is not a general SQL grammar.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{multispace0, multispace1},
    combinator::{map, opt, value},
    sequence::{delimited, pair, tuple},
};

use crate::model::{
    RoutineDefinition, TableDefinition, TriggerDefinition, TriggerEvent, TriggerTiming,
};
use crate::normalize::{code_mask, find_word, split_routine};

/// Parse a CREATE TABLE statement into its structural shape.
///
/// Clauses are split at paren depth 0 with quote awareness, so nested
/// parens (`decimal(10,2)`, `enum('a,b')`) and quoted commas never cause a
/// false split. Each clause keeps its verbatim definition text.
pub fn parse_table_definition(sql: &str) -> TableDefinition {
    let mut def = TableDefinition::default();

    let mask = code_mask(sql);
    let Some((_, after_kw)) = find_word(sql, &mask, "TABLE", 0) else {
        return def;
    };
    let rest = &sql[after_kw..];
    let Ok((rest, name)) = table_name(rest) else {
        return def;
    };
    def.table_name = name;

    let Some(body) = paren_block(rest) else {
        return def;
    };
    for clause in split_clauses(body) {
        classify_clause(&mut def, clause.trim());
    }
    def
}

/// Parse a CREATE TRIGGER statement. `None` when the head does not match.
pub fn parse_trigger_definition(sql: &str) -> Option<TriggerDefinition> {
    let mask = code_mask(sql);
    let (_, after_kw) = find_word(sql, &mask, "TRIGGER", 0)?;
    let rest = sql[after_kw..].trim_start();

    let (rest, trigger_name) = identifier(rest).ok()?;
    let (rest, timing) = trigger_timing(rest.trim_start()).ok()?;
    let (rest, event) = trigger_event(rest.trim_start()).ok()?;
    let on: IResult<&str, &str> = tag_no_case("ON")(rest.trim_start());
    let (rest, _) = on.ok()?;
    let (rest, table_name) = qualified_identifier(rest.trim_start()).ok()?;

    // Body is everything after FOR EACH ROW.
    let rest_mask = code_mask(rest);
    let (_, body_start) = find_word(rest, &rest_mask, "ROW", 0)?;
    let body = rest[body_start..].trim().to_string();

    Some(TriggerDefinition {
        trigger_name,
        timing,
        event,
        table_name,
        body,
    })
}

/// Parse a CREATE FUNCTION / PROCEDURE statement into name, header and body.
///
/// `None` when there is no routine keyword or no standalone BEGIN.
pub fn parse_routine_definition(sql: &str) -> Option<RoutineDefinition> {
    let mask = code_mask(sql);
    let after_kw = find_word(sql, &mask, "FUNCTION", 0)
        .or_else(|| find_word(sql, &mask, "PROCEDURE", 0))?
        .1;
    let (_, name) = identifier(sql[after_kw..].trim_start()).ok()?;
    let (header, body) = split_routine(sql)?;
    Some(RoutineDefinition { name, header, body })
}

/// Table name after the TABLE keyword, skipping IF NOT EXISTS.
fn table_name(input: &str) -> IResult<&str, String> {
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(tuple((
        tag_no_case("IF"),
        multispace1,
        tag_no_case("NOT"),
        multispace1,
        tag_no_case("EXISTS"),
        multispace1,
    )))(input)?;
    qualified_identifier(input)
}

/// A backtick-quoted or bare identifier.
fn identifier(input: &str) -> IResult<&str, String> {
    alt((
        map(
            delimited(tag("`"), take_while1(|c| c != '`'), tag("`")),
            |s: &str| s.to_string(),
        ),
        map(
            take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
            |s: &str| s.to_string(),
        ),
    ))(input)
}

/// An identifier with an optional `db.` qualifier; returns the object part.
fn qualified_identifier(input: &str) -> IResult<&str, String> {
    let (input, first) = identifier(input)?;
    let (input, second) = opt(pair(tag("."), identifier))(input)?;
    Ok((input, second.map(|(_, s)| s).unwrap_or(first)))
}

fn trigger_timing(input: &str) -> IResult<&str, TriggerTiming> {
    alt((
        value(TriggerTiming::Before, tag_no_case("BEFORE")),
        value(TriggerTiming::After, tag_no_case("AFTER")),
    ))(input)
}

fn trigger_event(input: &str) -> IResult<&str, TriggerEvent> {
    alt((
        value(TriggerEvent::Insert, tag_no_case("INSERT")),
        value(TriggerEvent::Update, tag_no_case("UPDATE")),
        value(TriggerEvent::Delete, tag_no_case("DELETE")),
    ))(input)
}

/// The text inside the outermost paren block, quote-aware.
fn paren_block(input: &str) -> Option<&str> {
    let mask = code_mask(input);
    let bytes = input.as_bytes();
    let start = (0..bytes.len()).find(|&i| mask[i] && bytes[i] == b'(')?;
    let mut depth = 0usize;
    for i in start..bytes.len() {
        if !mask[i] {
            continue;
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start + 1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a clause list at depth-0 commas, quote-aware.
fn split_clauses(body: &str) -> Vec<&str> {
    let mask = code_mask(body);
    let bytes = body.as_bytes();
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for i in 0..bytes.len() {
        if !mask[i] {
            continue;
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                clauses.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    clauses.push(&body[start..]);
    clauses
}

/// Route one depth-0 clause into columns, primary key, or indexes.
fn classify_clause(def: &mut TableDefinition, clause: &str) {
    if clause.is_empty() {
        return;
    }
    let upper = clause.to_uppercase();
    if upper.starts_with("PRIMARY KEY") {
        def.primary_key = key_columns(clause);
        return;
    }
    if let Some(rest) = strip_index_head(clause, &upper) {
        let name = match identifier(rest.trim_start()) {
            Ok((_, name)) => name,
            // Unnamed key clause; keyed by its column list.
            Err(_) => key_columns(clause).join(","),
        };
        def.indexes.push((name, clause.to_string()));
        return;
    }
    if let Ok((_, name)) = identifier(clause) {
        def.columns.push((name, clause.to_string()));
    }
}

/// Strip a leading index-clause head, returning the text after it.
fn strip_index_head<'a>(clause: &'a str, upper: &str) -> Option<&'a str> {
    for head in [
        "UNIQUE KEY",
        "UNIQUE INDEX",
        "UNIQUE",
        "FULLTEXT KEY",
        "FULLTEXT INDEX",
        "FULLTEXT",
        "SPATIAL KEY",
        "SPATIAL INDEX",
        "CONSTRAINT",
        "FOREIGN KEY",
        "KEY",
        "INDEX",
    ] {
        if upper.starts_with(head) {
            // Word boundary: "KEY" must not swallow a column named key_name.
            let boundary = upper[head.len()..]
                .bytes()
                .next()
                .is_none_or(|b| !crate::normalize::is_word_byte(b));
            if boundary {
                return Some(&clause[head.len()..]);
            }
        }
    }
    None
}

/// Column names inside the first paren group of a key clause.
fn key_columns(clause: &str) -> Vec<String> {
    let Some(inner) = paren_block(clause) else {
        return Vec::new();
    };
    inner
        .split(',')
        .map(|c| c.trim().trim_matches('`').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}
