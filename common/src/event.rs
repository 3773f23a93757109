use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unbalanced group: missing closing ')'")]
    UnbalancedGroup,
    #[error("Unexpected ')' outside of a group")]
    UnexpectedClosing,
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Empty command")]
    EmptyCommand,
}

/// One token of a parsed command: an atomic literal, or a nested
/// sub-command in parentheses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(String),
    Group(Event),
}

impl Token {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Token::Atom(s) => Some(s),
            Token::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Event> {
        match self {
            Token::Atom(_) => None,
            Token::Group(event) => Some(event),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Atom(s) if s.contains(char::is_whitespace) => write!(f, "\"{}\"", s),
            Token::Atom(s) => write!(f, "{}", s),
            Token::Group(event) => write!(f, "({})", event),
        }
    }
}

/// A parsed scenario command: an ordered, possibly nested token
/// sequence. Immutable once parsed; the first atom is the command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    tokens: Vec<Token>,
}

impl Event {
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Command (family) name, when the event starts with an atom.
    pub fn name(&self) -> Option<&str> {
        self.tokens.first().and_then(Token::as_atom)
    }

    /// Argument tokens following the command name.
    pub fn args(&self) -> &[Token] {
        if self.tokens.is_empty() {
            &[]
        } else {
            &self.tokens[1..]
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.tokens.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Parse one command line into an event tree. Splits on whitespace,
/// groups with `( ... )`, and keeps double-quoted atoms intact.
pub fn parse(text: &str) -> Result<Event, ParseError> {
    let mut chars = text.chars().peekable();
    let event = parse_tokens(&mut chars, false)?;
    if event.tokens.is_empty() {
        return Err(ParseError::EmptyCommand);
    }
    Ok(event)
}

fn parse_tokens(chars: &mut Peekable<Chars>, nested: bool) -> Result<Event, ParseError> {
    let mut tokens = Vec::new();
    while let Some(&c) = chars.peek() {
        match c {
            _ if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Group(parse_tokens(chars, true)?));
            }
            ')' => {
                if !nested {
                    return Err(ParseError::UnexpectedClosing);
                }
                chars.next();
                return Ok(Event { tokens });
            }
            '"' => {
                chars.next();
                tokens.push(Token::Atom(read_quoted(chars)?));
            }
            _ => {
                tokens.push(Token::Atom(read_atom(chars)));
            }
        }
    }

    if nested {
        return Err(ParseError::UnbalancedGroup);
    }
    Ok(Event { tokens })
}

fn read_quoted(chars: &mut Peekable<Chars>) -> Result<String, ParseError> {
    let mut atom = String::new();
    for c in chars.by_ref() {
        if c == '"' {
            return Ok(atom);
        }
        atom.push(c);
    }
    Err(ParseError::UnterminatedString)
}

fn read_atom(chars: &mut Peekable<Chars>) -> String {
    let mut atom = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
            break;
        }
        atom.push(c);
        chars.next();
    }
    atom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_command() {
        let event = parse("Deploy MyVault BRNVault 5").unwrap();
        assert_eq!(event.name(), Some("Deploy"));
        assert_eq!(event.args().len(), 3);
        assert_eq!(event.args()[0], Token::Atom("MyVault".to_owned()));
    }

    #[test]
    fn test_parse_nested_group() {
        let event = parse("From alice (Deploy MyVault BRNVault)").unwrap();
        assert_eq!(event.name(), Some("From"));
        let inner = event.args()[1].as_group().unwrap();
        assert_eq!(inner.name(), Some("Deploy"));
        assert_eq!(inner.args().len(), 2);
    }

    #[test]
    fn test_parse_deeply_nested() {
        let event = parse("A (B (C d) e)").unwrap();
        let b = event.args()[0].as_group().unwrap();
        let c = b.args()[0].as_group().unwrap();
        assert_eq!(c.name(), Some("C"));
        assert_eq!(c.args(), &[Token::Atom("d".to_owned())]);
    }

    #[test]
    fn test_parse_quoted_atom() {
        let event = parse("Log \"hello world\"").unwrap();
        assert_eq!(event.args(), &[Token::Atom("hello world".to_owned())]);
    }

    #[test]
    fn test_unbalanced_group() {
        assert_eq!(parse("Deploy (MyVault"), Err(ParseError::UnbalancedGroup));
        assert_eq!(parse("Deploy MyVault)"), Err(ParseError::UnexpectedClosing));
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(parse("Log \"oops"), Err(ParseError::UnterminatedString));
    }

    #[test]
    fn test_empty_command() {
        assert_eq!(parse("   "), Err(ParseError::EmptyCommand));
    }

    #[test]
    fn test_display_round_trip() {
        let text = "From alice (Deploy MyVault BRNVault 5)";
        let event = parse(text).unwrap();
        assert_eq!(event.to_string(), text);
    }
}
