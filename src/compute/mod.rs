//! Compute Module
//!
//! Turns a text query line into a validated [`Query`]: a table-driven
//! tokenizer followed by a semantic analyzer.

mod analyzer;
mod parser;

pub use analyzer::Analyzer;
pub use parser::Parser;

/// Token kind, assigned positionally by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Command,
    Key,
    Argument,
}

/// A single tokenized word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

/// Command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Get,
    Set,
    Del,
}

/// A validated query, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub command: Command,
    pub key: String,
    pub arg: Option<String>,
}

/// Parses and analyzes a raw query line in one call.
pub struct Compute {
    parser: Parser,
    analyzer: Analyzer,
}

impl Compute {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            analyzer: Analyzer::new(),
        }
    }

    pub fn handle_parse(&mut self, line: &str) -> crate::error::Result<Query> {
        let tokens = self.parser.parse(line)?;
        self.analyzer.analyze(tokens)
    }
}

impl Default for Compute {
    fn default() -> Self {
        Self::new()
    }
}
