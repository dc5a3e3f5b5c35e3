//! Semantic analyzer: token list -> validated [`Query`].

use super::{Command, Query, Token, TokenKind};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&mut self, tokens: Vec<Token>) -> Result<Query> {
        let cmd = tokens.first().ok_or(Error::EmptyQuery)?;

        if cmd.kind != TokenKind::Command {
            return Err(Error::MustBeCommand);
        }

        match cmd.value.as_str() {
            "GET" => {
                if tokens.len() != 2 {
                    return Err(Error::WrongNumberOfArguments("GET takes exactly one key"));
                }
                if tokens[1].value.is_empty() {
                    return Err(Error::WrongArgument("key"));
                }
                Ok(Query {
                    command: Command::Get,
                    key: tokens[1].value.clone(),
                    arg: None,
                })
            }
            "SET" => {
                if tokens.len() != 3 {
                    return Err(Error::WrongNumberOfArguments("SET takes exactly a key and a value"));
                }
                if tokens[1].kind != TokenKind::Key || tokens[1].value.is_empty() {
                    return Err(Error::WrongKey);
                }
                if tokens[2].kind != TokenKind::Argument || tokens[2].value.is_empty() {
                    return Err(Error::WrongArgument("value"));
                }
                Ok(Query {
                    command: Command::Set,
                    key: tokens[1].value.clone(),
                    arg: Some(tokens[2].value.clone()),
                })
            }
            "DEL" => {
                if tokens.len() != 2 {
                    return Err(Error::WrongNumberOfArguments("DEL takes exactly one key"));
                }
                if tokens[1].kind != TokenKind::Key || tokens[1].value.is_empty() {
                    return Err(Error::WrongArgument("key"));
                }
                Ok(Query {
                    command: Command::Del,
                    key: tokens[1].value.clone(),
                    arg: None,
                })
            }
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::Parser;

    fn analyze(line: &str) -> Result<Query> {
        let tokens = Parser::new().parse(line)?;
        Analyzer::new().analyze(tokens)
    }

    #[test]
    fn empty_query_fails() {
        assert!(matches!(analyze("").unwrap_err(), Error::EmptyQuery));
        assert!(matches!(analyze("   ").unwrap_err(), Error::EmptyQuery));
    }

    #[test]
    fn get_round_trips() {
        let q = analyze("GET k").unwrap();
        assert_eq!(q, Query { command: Command::Get, key: "k".into(), arg: None });
    }

    #[test]
    fn set_round_trips() {
        let q = analyze("SET k v").unwrap();
        assert_eq!(q, Query { command: Command::Set, key: "k".into(), arg: Some("v".into()) });
    }

    #[test]
    fn del_round_trips() {
        let q = analyze("DEL k").unwrap();
        assert_eq!(q, Query { command: Command::Del, key: "k".into(), arg: None });
    }

    #[test]
    fn unknown_command_fails() {
        assert!(matches!(analyze("FOO k").unwrap_err(), Error::UnknownCommand(_)));
    }

    #[test]
    fn wrong_arity_fails() {
        assert!(matches!(analyze("GET").unwrap_err(), Error::WrongNumberOfArguments(_)));
        assert!(matches!(analyze("SET k").unwrap_err(), Error::WrongNumberOfArguments(_)));
        assert!(matches!(analyze("GET k extra").unwrap_err(), Error::WrongNumberOfArguments(_)));
    }
}
