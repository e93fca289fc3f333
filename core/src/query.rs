//! Boolean query model and the query-string parser.
//!
//! Supported syntax:
//! - bare words and `"quoted phrases"` against the default field,
//! - `field:value` and `field:(group)` for `id`, `text` and `rep`,
//! - `word~N` fuzzy terms (`~` alone means an edit distance of 2),
//! - `AND`, `OR`, `NOT`, `+`/`-` prefixes, parentheses and `\` escapes.
//!
//! Each parenthesized level is a list of required, optional and prohibited
//! clauses. Plain clauses are optional; `AND` makes both of its neighbours
//! required; `NOT` and `-` prohibit, `+` requires. Values of keyword fields are
//! taken verbatim; `text` values go through the [`Analyzer`].

use crate::error::{IndexError, Result};
use crate::index::Field;
use crate::tokenizer::Analyzer;
use std::fmt;

/// Largest edit distance a fuzzy term may ask for.
pub const MAX_EDITS: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term { field: Field, text: String },
    /// Consecutive terms.
    Phrase { field: Field, terms: Vec<String> },
    Fuzzy { field: Field, text: String, max_edits: u8 },
    /// Every `must` clause matches and no `must_not` clause does. `should`
    /// clauses only add to the score, unless `must` is empty, in which case at
    /// least one of them has to match. With neither, nothing matches.
    Bool { must: Vec<Query>, should: Vec<Query>, must_not: Vec<Query> },
}

impl Query {
    pub fn term(field: Field, text: impl Into<String>) -> Self {
        Query::Term { field, text: text.into() }
    }

    pub fn and(clauses: Vec<Query>) -> Self {
        Query::Bool { must: clauses, should: Vec::new(), must_not: Vec::new() }
    }

    pub fn or(clauses: Vec<Query>) -> Self {
        Query::Bool { must: Vec::new(), should: clauses, must_not: Vec::new() }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Query::Bool { .. })
    }
}

const SPECIAL: &[char] = &['\\', '(', ')', ':', '"', '~'];

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for (i, c) in text.chars().enumerate() {
        if SPECIAL.contains(&c) || c.is_whitespace() || (i == 0 && matches!(c, '+' | '-')) {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

struct Nested<'a>(&'a Query);

impl fmt::Display for Nested<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_compound() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn write_joined<'q>(
    f: &mut fmt::Formatter<'_>,
    clauses: impl Iterator<Item = (&'static str, &'q Query)>,
    separator: &str,
) -> fmt::Result {
    for (i, (prefix, clause)) in clauses.enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{prefix}{}", Nested(clause))?;
    }
    Ok(())
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term { field, text } => {
                write!(f, "{field}:")?;
                write_escaped(f, text)
            }
            Query::Phrase { field, terms } => write!(f, "{field}:\"{}\"", terms.join(" ")),
            Query::Fuzzy { field, text, max_edits } => {
                write!(f, "{field}:")?;
                write_escaped(f, text)?;
                write!(f, "~{max_edits}")
            }
            Query::Bool { must, should, must_not } if should.is_empty() => {
                let clauses = must.iter().map(|q| ("", q)).chain(must_not.iter().map(|q| ("NOT ", q)));
                write_joined(f, clauses, " AND ")
            }
            Query::Bool { must, should, must_not } if must.is_empty() && must_not.is_empty() => {
                write_joined(f, should.iter().map(|q| ("", q)), " OR ")
            }
            Query::Bool { must, should, must_not } => {
                let clauses = must
                    .iter()
                    .map(|q| ("+", q))
                    .chain(should.iter().map(|q| ("", q)))
                    .chain(must_not.iter().map(|q| ("-", q)));
                write_joined(f, clauses, " ")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LParen,
    RParen,
    Colon,
    /// `~` with its optional edit distance.
    Tilde(Option<u32>),
    And,
    Or,
    Not,
    Plus,
    Minus,
    Word(String),
    Quoted(String),
}

fn lex(input: &str) -> Result<Vec<(Tok, usize)>> {
    let err = |position: usize, reason: &str| IndexError::QueryParse {
        query: input.to_string(),
        position,
        reason: reason.to_string(),
    };
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((Tok::LParen, pos));
            }
            ')' => {
                chars.next();
                tokens.push((Tok::RParen, pos));
            }
            ':' => {
                chars.next();
                tokens.push((Tok::Colon, pos));
            }
            // A leading sign is a modifier only when something follows it.
            '+' | '-' if input[pos + 1..].chars().next().is_some_and(|n| !n.is_whitespace()) => {
                chars.next();
                tokens.push((if c == '+' { Tok::Plus } else { Tok::Minus }, pos));
            }
            '~' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let distance = if digits.is_empty() {
                    None
                } else {
                    Some(digits.parse::<u32>().map_err(|_| err(pos, "edit distance out of range"))?)
                };
                tokens.push((Tok::Tilde(distance), pos));
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err(err(input.len(), "dangling escape")),
                        },
                        c => text.push(c),
                    }
                }
                if !closed {
                    return Err(err(pos, "unterminated phrase"));
                }
                tokens.push((Tok::Quoted(text), pos));
            }
            _ => {
                let mut word = String::new();
                let mut escaped_any = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | ':' | '"' | '~') {
                        break;
                    }
                    chars.next();
                    if c == '\\' {
                        match chars.next() {
                            Some((_, escaped)) => {
                                word.push(escaped);
                                escaped_any = true;
                            }
                            None => return Err(err(input.len(), "dangling escape")),
                        }
                    } else {
                        word.push(c);
                    }
                }
                let tok = match word.as_str() {
                    "AND" if !escaped_any => Tok::And,
                    "OR" if !escaped_any => Tok::Or,
                    "NOT" if !escaped_any => Tok::Not,
                    _ => Tok::Word(word),
                };
                tokens.push((tok, pos));
            }
        }
    }
    Ok(tokens)
}

/// Parses query strings against a default field with a shared analyzer.
#[derive(Debug)]
pub struct QueryParser<'a> {
    default_field: Field,
    analyzer: &'a Analyzer,
}

impl<'a> QueryParser<'a> {
    pub fn new(default_field: Field, analyzer: &'a Analyzer) -> Self {
        Self { default_field, analyzer }
    }

    pub fn parse(&self, input: &str) -> Result<Query> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Err(IndexError::InvalidQuery("empty query".to_string()));
        }
        let mut parser = Parser { input, tokens, idx: 0, analyzer: self.analyzer };
        let query = parser.parse_bool(self.default_field)?;
        if let Some((tok, pos)) = parser.tokens.get(parser.idx) {
            return Err(parser.error_at(*pos, format!("unexpected {}", describe(tok))));
        }
        query.ok_or_else(|| IndexError::InvalidQuery(format!("`{input}` contains no searchable terms")))
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::LParen => "`(`".into(),
        Tok::RParen => "`)`".into(),
        Tok::Colon => "`:`".into(),
        Tok::Tilde(_) => "`~`".into(),
        Tok::And => "AND".into(),
        Tok::Or => "OR".into(),
        Tok::Not => "NOT".into(),
        Tok::Plus => "`+`".into(),
        Tok::Minus => "`-`".into(),
        Tok::Word(w) => format!("`{w}`"),
        Tok::Quoted(q) => format!("\"{q}\""),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conjunction {
    None,
    And,
    Or,
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(Tok, usize)>,
    idx: usize,
    analyzer: &'a Analyzer,
}

impl<'a> Parser<'a> {
    fn error_at(&self, position: usize, reason: impl Into<String>) -> IndexError {
        IndexError::QueryParse { query: self.input.to_string(), position, reason: reason.into() }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.idx).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Tok, usize)> {
        let tok = self.tokens.get(self.idx).cloned();
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn unexpected(&self) -> IndexError {
        match self.tokens.get(self.idx) {
            Some((tok, pos)) => self.error_at(*pos, format!("unexpected {}", describe(tok))),
            None => self.error_at(self.input.len(), "unexpected end of input"),
        }
    }

    /// One boolean level, up to a closing parenthesis or the end of input.
    fn parse_bool(&mut self, field: Field) -> Result<Option<Query>> {
        let mut clauses: Vec<(Occur, Query)> = Vec::new();
        let mut first = true;
        loop {
            let conjunction = match self.peek() {
                None | Some(Tok::RParen) => break,
                Some(Tok::And | Tok::Or) if first => return Err(self.unexpected()),
                Some(Tok::And) => {
                    self.next();
                    Conjunction::And
                }
                Some(Tok::Or) => {
                    self.next();
                    Conjunction::Or
                }
                Some(_) => Conjunction::None,
            };
            let modifier = match self.peek() {
                Some(Tok::Not | Tok::Minus) => {
                    self.next();
                    Some(Occur::MustNot)
                }
                Some(Tok::Plus) => {
                    self.next();
                    Some(Occur::Must)
                }
                _ => None,
            };
            let query = self.parse_primary(field)?;

            // `AND` also makes the clause before it required, even when the
            // clause after it analyzes to nothing.
            if conjunction == Conjunction::And {
                if let Some((occur, _)) = clauses.last_mut() {
                    if *occur != Occur::MustNot {
                        *occur = Occur::Must;
                    }
                }
            }
            let occur = modifier.unwrap_or(if conjunction == Conjunction::And { Occur::Must } else { Occur::Should });
            if let Some(query) = query {
                clauses.push((occur, query));
            }
            first = false;
        }
        Ok(combine(clauses))
    }

    fn parse_primary(&mut self, field: Field) -> Result<Option<Query>> {
        match self.peek() {
            Some(Tok::LParen) => {
                self.next();
                let query = self.parse_bool(field)?;
                match self.next() {
                    Some((Tok::RParen, _)) => Ok(query),
                    Some((tok, pos)) => Err(self.error_at(pos, format!("expected `)`, found {}", describe(&tok)))),
                    None => Err(self.error_at(self.input.len(), "unbalanced parenthesis")),
                }
            }
            Some(Tok::Word(_)) if matches!(self.tokens.get(self.idx + 1), Some((Tok::Colon, _))) => {
                let Some((Tok::Word(name), pos)) = self.next() else { return Err(self.unexpected()) };
                self.next();
                let target = Field::from_name(&name)
                    .ok_or_else(|| self.error_at(pos, format!("unknown field `{name}`")))?;
                match self.peek() {
                    Some(Tok::LParen) => self.parse_primary(target),
                    Some(Tok::Word(_) | Tok::Quoted(_)) => self.parse_value(target),
                    _ => Err(self.unexpected()),
                }
            }
            Some(Tok::Word(_) | Tok::Quoted(_)) => self.parse_value(field),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_value(&mut self, field: Field) -> Result<Option<Query>> {
        let (tok, pos) = self.next().ok_or_else(|| self.unexpected())?;
        let fuzzy = match self.peek() {
            Some(Tok::Tilde(distance)) => {
                let distance = distance.unwrap_or(MAX_EDITS as u32);
                self.next();
                Some(distance)
            }
            _ => None,
        };
        match (tok, fuzzy) {
            (Tok::Word(word), None) => Ok(self.term_query(field, &word)),
            (Tok::Word(word), Some(distance)) => {
                if distance > MAX_EDITS as u32 {
                    return Err(self.error_at(pos, format!("edit distance must be at most {MAX_EDITS}")));
                }
                let text = if field.is_keyword() { word } else { self.analyzer.normalize(&word) };
                if text.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Query::Fuzzy { field, text, max_edits: distance as u8 }))
            }
            (Tok::Quoted(phrase), None) => Ok(self.term_query(field, &phrase)),
            (Tok::Quoted(_), Some(_)) => Err(self.error_at(pos, "proximity phrases are not supported")),
            (tok, _) => Err(self.error_at(pos, format!("unexpected {}", describe(&tok)))),
        }
    }

    fn term_query(&self, field: Field, raw: &str) -> Option<Query> {
        if field.is_keyword() {
            return Some(Query::term(field, raw));
        }
        let mut terms: Vec<String> = self.analyzer.tokenize(raw).into_iter().map(|(t, _)| t).collect();
        match terms.len() {
            0 => None,
            1 => terms.pop().map(|text| Query::Term { field, text }),
            _ => Some(Query::Phrase { field, terms }),
        }
    }
}

/// A single required or optional clause stands for itself.
fn combine(clauses: Vec<(Occur, Query)>) -> Option<Query> {
    let mut must = Vec::new();
    let mut should = Vec::new();
    let mut must_not = Vec::new();
    for (occur, query) in clauses {
        match occur {
            Occur::Must => must.push(query),
            Occur::Should => should.push(query),
            Occur::MustNot => must_not.push(query),
        }
    }
    match (must.len(), should.len(), must_not.len()) {
        (0, 0, 0) => None,
        (1, 0, 0) => must.pop(),
        (0, 1, 0) => should.pop(),
        _ => Some(Query::Bool { must, should, must_not }),
    }
}
