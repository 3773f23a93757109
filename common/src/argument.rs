use std::collections::HashMap;

use thiserror::Error;

use crate::event::Token;
use crate::value::{Value, ValueError, ValueKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("Expected required argument '{}'", _0)]
    MissingArgument(String),
    #[error("Too many arguments")]
    TooManyArguments,
    #[error("Argument '{}' not found", _0)]
    NotFound(String),
    #[error("Invalid signature: {}", _0)]
    InvalidSignature(String),
}

/// One positional parameter declaration. A catchall arg collects all
/// remaining tokens into a list and must be the last arg of a signature.
pub struct Arg {
    name: String,
    kind: ValueKind,
    default: Option<Value>,
    catchall: bool,
}

impl Arg {
    pub fn new(name: &str, kind: ValueKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            default: None,
            catchall: false,
        }
    }

    pub fn with_default(name: &str, kind: ValueKind, default: Value) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            default: Some(default),
            catchall: false,
        }
    }

    /// Variadic trailing parameter; `kind` is the element kind.
    pub fn catchall(name: &str, kind: ValueKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            default: None,
            catchall: true,
        }
    }

    pub fn get_name(&self) -> &String {
        &self.name
    }

    pub fn get_kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn get_default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_catchall(&self) -> bool {
        self.catchall
    }
}

/// Check the structural invariants of an ordered signature:
/// at most one catchall, and only in last position.
pub fn validate_signature(args: &[Arg]) -> Result<(), ArgError> {
    let catchalls = args.iter().filter(|arg| arg.is_catchall()).count();
    if catchalls > 1 {
        return Err(ArgError::InvalidSignature(
            "at most one catchall argument is allowed".to_owned(),
        ));
    }
    if catchalls == 1 && !args.last().map(Arg::is_catchall).unwrap_or(false) {
        return Err(ArgError::InvalidSignature(
            "catchall argument must be last".to_owned(),
        ));
    }
    Ok(())
}

/// Bind event tokens against a signature, coercing each token to its
/// declared kind. Arity must match exactly unless the signature ends
/// with a catchall.
pub fn bind(specs: &[Arg], tokens: &[Token]) -> Result<Arguments, ArgError> {
    let mut values = HashMap::new();
    let mut cursor = 0;

    for spec in specs {
        if spec.is_catchall() {
            let mut rest = Vec::new();
            while cursor < tokens.len() {
                rest.push(coerce_catchall_token(spec.get_kind(), &tokens[cursor])?);
                cursor += 1;
            }
            values.insert(spec.get_name().clone(), Value::List(rest));
            continue;
        }

        match tokens.get(cursor) {
            Some(token) => {
                values.insert(spec.get_name().clone(), coerce_token(spec.get_kind(), token)?);
                cursor += 1;
            }
            None => match spec.get_default() {
                Some(default) => {
                    values.insert(spec.get_name().clone(), default.clone());
                }
                None => return Err(ArgError::MissingArgument(spec.get_name().clone())),
            },
        }
    }

    if cursor < tokens.len() {
        return Err(ArgError::TooManyArguments);
    }

    Ok(Arguments::new(values))
}

fn coerce_token(kind: &ValueKind, token: &Token) -> Result<Value, ArgError> {
    match token {
        Token::Atom(raw) => Ok(kind.coerce(raw)?),
        // A group only binds to a list kind, element-wise
        Token::Group(event) => match kind {
            ValueKind::List(inner) => {
                let mut values = Vec::new();
                for inner_token in event.tokens() {
                    values.push(coerce_token(inner, inner_token)?);
                }
                Ok(Value::List(values))
            }
            other => Err(ValueError::TypeMismatch {
                expected: other.clone(),
                got: format!("({})", event),
            }
            .into()),
        },
    }
}

// Under a catchall, a group token becomes a list of the element kind
fn coerce_catchall_token(kind: &ValueKind, token: &Token) -> Result<Value, ArgError> {
    match token {
        Token::Atom(_) => coerce_token(kind, token),
        Token::Group(_) => coerce_token(&ValueKind::list_of(kind.clone()), token),
    }
}

/// Typed values produced by binding, addressed by arg name.
/// Values are moved out on access.
pub struct Arguments {
    values: HashMap<String, Value>,
}

impl Arguments {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get_value(&mut self, name: &str) -> Result<Value, ArgError> {
        self.values
            .remove(name)
            .ok_or_else(|| ArgError::NotFound(name.to_owned()))
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    // Get flag value
    // If its not present, return false
    pub fn get_flag(&mut self, name: &str) -> Result<bool, ArgError> {
        match self.values.remove(name) {
            Some(value) => Ok(value.to_bool()?),
            None => Ok(false),
        }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }
}
