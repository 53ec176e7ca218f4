//! The job-match grammar used by `status`/`kill`/`rerun` to select which
//! jobs a command applies to (spec.md §6).
//!
//! ```text
//! expr   := term (' or ' term)*
//! term   := factor (' and ' factor)*
//! factor := 'not' factor | '(' expr ')' | atom
//! atom   := 'all' | 'id:' NUMBER | 'name:' GLOB | 'state:' STATE
//! ```

use crate::proto::{JobSnapshot, JobStateKind};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, serde::Serialize)]
pub enum JobMatch {
    All,
    Id(crate::ids::JobId),
    NameGlob(String),
    State(JobStateKind),
    And(Box<JobMatch>, Box<JobMatch>),
    Or(Box<JobMatch>, Box<JobMatch>),
    Not(Box<JobMatch>),
}

use serde::Deserialize;

impl JobMatch {
    pub fn matches(&self, snapshot: &JobSnapshot) -> bool {
        match self {
            JobMatch::All => true,
            JobMatch::Id(id) => snapshot.id == *id,
            JobMatch::NameGlob(pattern) => glob_match(pattern, &snapshot.request.name),
            JobMatch::State(kind) => snapshot.state.kind() == *kind,
            JobMatch::And(a, b) => a.matches(snapshot) && b.matches(snapshot),
            JobMatch::Or(a, b) => a.matches(snapshot) || b.matches(snapshot),
            JobMatch::Not(a) => !a.matches(snapshot),
        }
    }
}

/// A `*`-only glob: `*` matches any run of characters (including none),
/// every other character must match literally. No escaping, no `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn go(pattern: &[u8], text: &[u8]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some(b'*') => {
                go(&pattern[1..], text)
                    || (!text.is_empty() && go(pattern, &text[1..]))
            }
            Some(c) => text.first() == Some(c) && go(&pattern[1..], &text[1..]),
        }
    }
    go(pattern.as_bytes(), text.as_bytes())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of filter expression")]
    UnexpectedEof,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("invalid job id {0:?}")]
    InvalidId(String),
    #[error("unknown state {0:?} (expected one of queued, running, finished, failed, killed)")]
    UnknownState(String),
    #[error("unclosed '('")]
    UnclosedParen,
    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),
}

struct Parser<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let tokens = tokenize(input);
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'a str> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expr(&mut self) -> Result<JobMatch, ParseError> {
        let mut lhs = self.parse_term()?;
        while self.peek() == Some("or") {
            self.next();
            let rhs = self.parse_term()?;
            lhs = JobMatch::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<JobMatch, ParseError> {
        let mut lhs = self.parse_factor()?;
        while self.peek() == Some("and") {
            self.next();
            let rhs = self.parse_factor()?;
            lhs = JobMatch::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<JobMatch, ParseError> {
        match self.peek() {
            Some("not") => {
                self.next();
                Ok(JobMatch::Not(Box::new(self.parse_factor()?)))
            }
            Some("(") => {
                self.next();
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(")") => Ok(inner),
                    _ => Err(ParseError::UnclosedParen),
                }
            }
            Some(_) => self.parse_atom(),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn parse_atom(&mut self) -> Result<JobMatch, ParseError> {
        let tok = self.next().ok_or(ParseError::UnexpectedEof)?;
        if tok == "all" {
            return Ok(JobMatch::All);
        }
        if let Some(rest) = tok.strip_prefix("id:") {
            let n: u64 = rest
                .parse()
                .map_err(|_| ParseError::InvalidId(rest.to_string()))?;
            return Ok(JobMatch::Id(crate::ids::JobId(n)));
        }
        if let Some(rest) = tok.strip_prefix("name:") {
            return Ok(JobMatch::NameGlob(rest.to_string()));
        }
        if let Some(rest) = tok.strip_prefix("state:") {
            let kind = match rest {
                "queued" => JobStateKind::Queued,
                "running" => JobStateKind::Running,
                "finished" => JobStateKind::Finished,
                "failed" => JobStateKind::Failed,
                "killed" => JobStateKind::Killed,
                other => return Err(ParseError::UnknownState(other.to_string())),
            };
            return Ok(JobMatch::State(kind));
        }
        Err(ParseError::UnexpectedToken(tok.to_string()))
    }
}

/// Splits on whitespace but keeps `(` and `)` as their own tokens even when
/// jammed up against a neighbor, e.g. `(id:3)`.
fn tokenize(input: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let bytes = input.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let is_paren = b == b'(' || b == b')';
        if b.is_ascii_whitespace() || is_paren {
            if let Some(s) = start.take() {
                tokens.push(&input[s..i]);
            }
            if is_paren {
                tokens.push(&input[i..i + 1]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&input[s..]);
    }
    tokens
}

impl FromStr for JobMatch {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(input);
        if parser.peek().is_none() {
            return Ok(JobMatch::All);
        }
        let expr = parser.parse_expr()?;
        if let Some(tok) = parser.peek() {
            return Err(ParseError::TrailingInput(tok.to_string()));
        }
        Ok(expr)
    }
}

impl fmt::Display for JobMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobMatch::All => write!(f, "all"),
            JobMatch::Id(id) => write!(f, "id:{}", id.0),
            JobMatch::NameGlob(g) => write!(f, "name:{g}"),
            JobMatch::State(k) => write!(f, "state:{k:?}"),
            JobMatch::And(a, b) => write!(f, "({a} and {b})"),
            JobMatch::Or(a, b) => write!(f, "({a} or {b})"),
            JobMatch::Not(a) => write!(f, "not {a}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_matches_any_suffix() {
        assert!(glob_match("build-*", "build-release"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("build-*", "test-release"));
    }

    #[test]
    fn parses_all_when_empty() {
        assert_eq!("".parse::<JobMatch>().unwrap(), JobMatch::All);
    }

    #[test]
    fn parses_id_atom() {
        assert_eq!(
            "id:42".parse::<JobMatch>().unwrap(),
            JobMatch::Id(crate::ids::JobId(42))
        );
    }

    #[test]
    fn parses_and_or_not_with_precedence() {
        let m = "state:running or state:queued and not name:foo*"
            .parse::<JobMatch>()
            .unwrap();
        let expected = JobMatch::Or(
            Box::new(JobMatch::State(JobStateKind::Running)),
            Box::new(JobMatch::And(
                Box::new(JobMatch::State(JobStateKind::Queued)),
                Box::new(JobMatch::Not(Box::new(JobMatch::NameGlob(
                    "foo*".to_string(),
                )))),
            )),
        );
        assert_eq!(m, expected);
    }

    #[test]
    fn parens_override_precedence() {
        let m = "(state:running or state:queued) and not name:foo*"
            .parse::<JobMatch>()
            .unwrap();
        let expected = JobMatch::And(
            Box::new(JobMatch::Or(
                Box::new(JobMatch::State(JobStateKind::Running)),
                Box::new(JobMatch::State(JobStateKind::Queued)),
            )),
            Box::new(JobMatch::Not(Box::new(JobMatch::NameGlob(
                "foo*".to_string(),
            )))),
        );
        assert_eq!(m, expected);
    }

    #[test]
    fn rejects_unclosed_paren() {
        assert_eq!(
            "(id:1".parse::<JobMatch>(),
            Err(ParseError::UnclosedParen)
        );
    }

    #[test]
    fn rejects_unknown_state() {
        assert_eq!(
            "state:limbo".parse::<JobMatch>(),
            Err(ParseError::UnknownState("limbo".to_string()))
        );
    }
}
