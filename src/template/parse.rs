//! template::parse
//!
//! Lexer and parser for the template language.
//!
//! The grammar is a small subset of Go's `text/template`:
//!
//! ```text
//! template  := (text | action)*
//! action    := "{{" ["-" ws] pipeline [ws "-"] "}}"
//! pipeline  := command ("|" command)*
//! command   := operand operand*
//! operand   := field | string | integer | identifier | "(" pipeline ")"
//! ```
//!
//! `{{-` trims whitespace before the action, `-}}` trims it after.

use super::funcs;
use super::TemplateError;

/// Parsed template node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
}

/// Commands chained with `|`; each result feeds the next command's last argument.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Field(String),
    Str(String),
    Int(i64),
    Func(String),
    Pipe(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(String),
    Str(String),
    Int(i64),
    Ident(String),
    Pipe,
    LParen,
    RParen,
}

/// Parse template source into nodes.
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    let mut rest = source;
    let mut offset = 0;
    let mut trim_next_text = false;

    while let Some(start) = rest.find("{{") {
        let mut text = &rest[..start];
        if trim_next_text {
            text = text.trim_start();
        }

        let after_open = &rest[start + 2..];
        let trim_left = after_open.starts_with("- ")
            || after_open.starts_with("-\t")
            || after_open.starts_with("-\n");
        if trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            nodes.push(Node::Text(text.to_string()));
        }

        let body_start = if trim_left { 3 } else { 2 };
        let action_offset = offset + start + body_start;
        let (tokens, consumed, trim_right) = lex_action(&rest[start + body_start..], action_offset)?;

        let mut parser = Parser {
            tokens,
            pos: 0,
            offset: action_offset,
        };
        let pipeline = parser.pipeline()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected token after pipeline"));
        }
        nodes.push(Node::Action(pipeline));

        let advance = start + body_start + consumed;
        offset += advance;
        rest = &rest[advance..];
        trim_next_text = trim_right;
    }

    let mut tail = rest;
    if trim_next_text {
        tail = tail.trim_start();
    }
    if !tail.is_empty() {
        nodes.push(Node::Text(tail.to_string()));
    }

    Ok(nodes)
}

/// Lex one action body up to and including its closing `}}`.
///
/// Returns the tokens, the number of bytes consumed and whether the action
/// ended with a `-}}` trim marker.
fn lex_action(input: &str, offset: usize) -> Result<(Vec<Token>, usize, bool), TemplateError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    let err = |at: usize, message: &str| TemplateError::Parse {
        offset: offset + at,
        message: message.to_string(),
    };

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                // A trim marker is whitespace, '-', then the closing braces.
                if input[i..].trim_start().starts_with("-}}") {
                    let dash = i + (input[i..].len() - input[i..].trim_start().len());
                    return Ok((tokens, dash + 3, true));
                }
                i += 1;
            }
            b'}' if input[i..].starts_with("}}") => {
                return Ok((tokens, i + 2, false));
            }
            b'|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'"' => {
                let (value, len) = lex_string(&input[i..]).ok_or_else(|| err(i, "unterminated string"))?;
                tokens.push(Token::Str(value));
                i += len;
            }
            b'`' => {
                let end = input[i + 1..]
                    .find('`')
                    .ok_or_else(|| err(i, "unterminated raw string"))?;
                tokens.push(Token::Str(input[i + 1..i + 1 + end].to_string()));
                i += end + 2;
            }
            b'.' => {
                let len = ident_len(&input[i + 1..]);
                if len == 0 {
                    return Err(err(i, "bare '.' is not supported"));
                }
                tokens.push(Token::Field(input[i + 1..i + 1 + len].to_string()));
                i += len + 1;
            }
            b'-' | b'0'..=b'9' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let value = input[start..i]
                    .parse::<i64>()
                    .map_err(|_| err(start, "invalid number"))?;
                tokens.push(Token::Int(value));
            }
            _ if c.is_ascii_alphabetic() || c == b'_' => {
                let len = ident_len(&input[i..]);
                tokens.push(Token::Ident(input[i..i + len].to_string()));
                i += len;
            }
            _ => return Err(err(i, "unexpected character in action")),
        }
    }

    Err(err(input.len(), "unclosed action"))
}

/// Lex a double-quoted string starting at `input[0]`.
fn lex_string(input: &str) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Some((out, idx + 1)),
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            '\n' => return None,
            other => out.push(other),
        }
    }
    None
}

fn ident_len(input: &str) -> usize {
    input
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    offset: usize,
}

impl Parser {
    fn error(&self, message: &str) -> TemplateError {
        TemplateError::Parse {
            offset: self.offset,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn pipeline(&mut self) -> Result<Pipeline, TemplateError> {
        let mut commands = vec![self.command()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            let command = self.command()?;
            if !matches!(command.operands.first(), Some(Operand::Func(_))) {
                return Err(self.error("non-function command in pipeline"));
            }
            commands.push(command);
        }
        Ok(Pipeline { commands })
    }

    fn command(&mut self) -> Result<Command, TemplateError> {
        let mut operands = Vec::new();
        while let Some(token) = self.peek().cloned() {
            let operand = match token {
                Token::Pipe | Token::RParen => break,
                Token::Field(name) => Operand::Field(name),
                Token::Str(s) => Operand::Str(s),
                Token::Int(n) => Operand::Int(n),
                Token::Ident(name) => {
                    if !funcs::exists(&name) {
                        return Err(TemplateError::UnknownFunction(name));
                    }
                    Operand::Func(name)
                }
                Token::LParen => {
                    self.pos += 1;
                    let inner = self.pipeline()?;
                    if self.peek() != Some(&Token::RParen) {
                        return Err(self.error("unclosed parenthesis"));
                    }
                    Operand::Pipe(inner)
                }
            };
            self.pos += 1;
            operands.push(operand);
        }

        match operands.first() {
            None => Err(self.error("missing value for command")),
            Some(Operand::Func(_)) => Ok(Command { operands }),
            Some(_) if operands.len() > 1 => Err(self.error("can't give argument to non-function")),
            Some(_) => Ok(Command { operands }),
        }
    }
}
