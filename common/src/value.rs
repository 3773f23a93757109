use std::fmt;

use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-chain account/contract address (20 bytes, hex-encoded with 0x prefix).
pub type Address = H160;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Type mismatch: expected {}, got '{}'", expected, got)]
    TypeMismatch { expected: ValueKind, got: String },
}

/// The closed set of kinds a scenario value can have.
/// Coercion from raw tokens is total over this set: a token either
/// converts to the requested kind or fails with a type mismatch,
/// never silently crossing kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Bool,
    Address,
    List(Box<ValueKind>),
}

impl ValueKind {
    pub fn list_of(inner: ValueKind) -> Self {
        ValueKind::List(Box::new(inner))
    }

    fn mismatch(&self, got: impl Into<String>) -> ValueError {
        ValueError::TypeMismatch {
            expected: self.clone(),
            got: got.into(),
        }
    }

    /// Convert a raw token into a typed value of this kind.
    pub fn coerce(&self, token: &str) -> Result<Value, ValueError> {
        Ok(match self {
            ValueKind::String => Value::String(token.to_owned()),
            ValueKind::Bool => {
                let token = token.to_lowercase();
                if ["true", "yes", "y", "1"].contains(&token.as_str()) {
                    Value::Bool(true)
                } else if ["false", "no", "n", "0"].contains(&token.as_str()) {
                    Value::Bool(false)
                } else {
                    return Err(self.mismatch(token));
                }
            }
            ValueKind::Number => {
                Value::Number(parse_number(token).ok_or_else(|| self.mismatch(token))?)
            }
            ValueKind::Address => {
                Value::Address(parse_address(token).ok_or_else(|| self.mismatch(token))?)
            }
            ValueKind::List(inner) => {
                let mut values = Vec::new();
                for part in token.split(',') {
                    values.push(inner.coerce(part.trim())?);
                }
                Value::List(values)
            }
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueKind::String => write!(f, "string"),
            ValueKind::Number => write!(f, "number"),
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Address => write!(f, "address"),
            ValueKind::List(inner) => write!(f, "list<{}>", inner),
        }
    }
}

/// A typed scenario value. Numbers are 256-bit unsigned words so
/// protocol amounts far beyond u64 range stay exact; floating point
/// is never involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Number(U256),
    Bool(bool),
    Address(Address),
    List(Vec<Value>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Number(_) => ValueKind::Number,
            Value::Bool(_) => ValueKind::Bool,
            Value::Address(_) => ValueKind::Address,
            Value::List(values) => ValueKind::list_of(
                values.first().map(Value::kind).unwrap_or(ValueKind::String),
            ),
        }
    }

    pub fn to_string_value(self) -> Result<String, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(ValueKind::String.mismatch(other.to_string())),
        }
    }

    pub fn to_number(self) -> Result<U256, ValueError> {
        match self {
            Value::Number(n) => Ok(n),
            other => Err(ValueKind::Number.mismatch(other.to_string())),
        }
    }

    pub fn to_bool(self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(b) => Ok(b),
            other => Err(ValueKind::Bool.mismatch(other.to_string())),
        }
    }

    pub fn to_address(self) -> Result<Address, ValueError> {
        match self {
            Value::Address(a) => Ok(a),
            other => Err(ValueKind::Address.mismatch(other.to_string())),
        }
    }

    pub fn to_list(self) -> Result<Vec<Value>, ValueError> {
        match self {
            Value::List(values) => Ok(values),
            other => Err(ValueKind::list_of(ValueKind::String).mismatch(other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Address(a) => write!(f, "{}", format_address(a)),
            Value::List(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Full (non-elided) 0x-prefixed hex form of an address.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

fn parse_number(token: &str) -> Option<U256> {
    if let Some(hex_part) = token.strip_prefix("0x") {
        return U256::from_str_radix(hex_part, 16).ok();
    }

    // Integral scientific notation: "2e26" -> 2 * 10^26
    if let Some((mantissa, exponent)) = token.split_once(['e', 'E']) {
        let base = U256::from_dec_str(mantissa).ok()?;
        let exponent: u32 = exponent.parse().ok()?;
        let mut value = base;
        for _ in 0..exponent {
            value = value.checked_mul(U256::from(10u64))?;
        }
        return Some(value);
    }

    U256::from_dec_str(token).ok()
}

/// Parse a 0x-prefixed 20-byte hex address.
pub fn parse_address(token: &str) -> Option<Address> {
    let hex_part = token.strip_prefix("0x")?;
    if hex_part.len() != 40 {
        return None;
    }
    let bytes = hex::decode(hex_part).ok()?;
    Some(Address::from_slice(&bytes))
}
