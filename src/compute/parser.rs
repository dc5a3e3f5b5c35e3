//! Tokenizing state machine.
//!
//! States: Initial, Letter, Space. Any byte outside the Letter/Space
//! classes is an immediate parse failure.

use super::{Token, TokenKind};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Letter,
    Space,
}

/// Tokenizes one query line at a time.
#[derive(Debug, Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&mut self, query: &str) -> Result<Vec<Token>> {
        let mut state = State::Initial;
        let mut tokens = Vec::with_capacity(3);
        let mut current_kind = None;
        let mut word = String::new();

        for (pos, &byte) in query.as_bytes().iter().enumerate() {
            if is_letter(byte) {
                current_kind = Some(match tokens.len() {
                    0 => TokenKind::Command,
                    1 => TokenKind::Key,
                    _ => TokenKind::Argument,
                });
                word.push(byte as char);
                state = State::Letter;
            } else if is_space(byte) {
                if state == State::Letter {
                    flush(&mut tokens, &mut current_kind, &mut word);
                }
                state = State::Space;
            } else {
                return Err(Error::WrongSymbol {
                    symbol: byte as char,
                    pos,
                });
            }
        }

        if current_kind.is_some() {
            flush(&mut tokens, &mut current_kind, &mut word);
        }

        Ok(tokens)
    }
}

fn flush(tokens: &mut Vec<Token>, current_kind: &mut Option<TokenKind>, word: &mut String) {
    if let Some(kind) = current_kind.take() {
        tokens.push(Token {
            kind,
            value: std::mem::take(word),
        });
    }
}

fn is_letter(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'*' || b == b'/'
}

fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\n'
}
