// src/abi.rs
use alloy::dyn_abi::DynSolType;
use alloy::json_abi::{Function, Param};
use serde_json::Value;
use std::{fmt, fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("failed to read ABI file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ABI is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ABI document has neither a top-level array nor an `abi` field")]
    MissingAbi,
    #[error("function entry #{index} has no name")]
    MissingName { index: usize },
    #[error("ABI entry #{index} is malformed: {source}")]
    InvalidEntry {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("unrecognized type `{ty}` in function `{function}`")]
    UnknownType { function: String, ty: String },
}

/// Solidity ABI type. Static types have a fixed head footprint, dynamic ones
/// are referenced through an offset word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSpec {
    Uint(usize),
    Int(usize),
    Bool,
    Address,
    FixedBytes(usize),
    Bytes,
    String,
    FixedArray(Box<TypeSpec>, usize),
    Array(Box<TypeSpec>),
    Tuple(Vec<TypeSpec>),
}

/// A type alloy can parse but calls are never decoded as (`function`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported ABI type `{0}`")]
pub struct UnsupportedType(pub String);

impl TypeSpec {
    pub fn is_dynamic(&self) -> bool {
        match self {
            TypeSpec::Bytes | TypeSpec::String | TypeSpec::Array(_) => true,
            TypeSpec::FixedArray(inner, _) => inner.is_dynamic(),
            TypeSpec::Tuple(fields) => fields.iter().any(TypeSpec::is_dynamic),
            TypeSpec::Uint(_)
            | TypeSpec::Int(_)
            | TypeSpec::Bool
            | TypeSpec::Address
            | TypeSpec::FixedBytes(_) => false,
        }
    }

    /// Number of 32-byte words the type occupies in the head of its
    /// enclosing tuple.
    pub fn head_words(&self) -> usize {
        if self.is_dynamic() {
            return 1;
        }
        match self {
            TypeSpec::FixedArray(inner, len) => inner.head_words().saturating_mul(*len),
            TypeSpec::Tuple(fields) => fields
                .iter()
                .fold(0usize, |acc, f| acc.saturating_add(f.head_words())),
            _ => 1,
        }
    }

    /// Parses a canonical type string such as `uint256`, `bytes32[]` or
    /// `(address,uint8)[2]`.
    pub fn parse(s: &str) -> Option<TypeSpec> {
        let ty = DynSolType::parse(s.trim()).ok()?;
        TypeSpec::try_from(&ty).ok()
    }

    /// Resolves an ABI parameter; `tuple` types are expanded from their
    /// `components`.
    pub fn from_param(param: &Param) -> Option<TypeSpec> {
        TypeSpec::parse(&param.selector_type())
    }
}

impl TryFrom<&DynSolType> for TypeSpec {
    type Error = UnsupportedType;

    fn try_from(ty: &DynSolType) -> Result<Self, Self::Error> {
        Ok(match ty {
            DynSolType::Bool => TypeSpec::Bool,
            DynSolType::Int(bits) => TypeSpec::Int(*bits),
            DynSolType::Uint(bits) => TypeSpec::Uint(*bits),
            DynSolType::FixedBytes(size) => TypeSpec::FixedBytes(*size),
            DynSolType::Address => TypeSpec::Address,
            DynSolType::Bytes => TypeSpec::Bytes,
            DynSolType::String => TypeSpec::String,
            DynSolType::Array(inner) => {
                TypeSpec::Array(Box::new(TypeSpec::try_from(inner.as_ref())?))
            }
            DynSolType::FixedArray(inner, len) => {
                TypeSpec::FixedArray(Box::new(TypeSpec::try_from(inner.as_ref())?), *len)
            }
            DynSolType::Tuple(fields) => TypeSpec::Tuple(
                fields
                    .iter()
                    .map(|field| TypeSpec::try_from(field))
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(UnsupportedType(other.to_string())),
        })
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Uint(bits) => write!(f, "uint{bits}"),
            TypeSpec::Int(bits) => write!(f, "int{bits}"),
            TypeSpec::Bool => f.write_str("bool"),
            TypeSpec::Address => f.write_str("address"),
            TypeSpec::FixedBytes(size) => write!(f, "bytes{size}"),
            TypeSpec::Bytes => f.write_str("bytes"),
            TypeSpec::String => f.write_str("string"),
            TypeSpec::FixedArray(inner, len) => write!(f, "{inner}[{len}]"),
            TypeSpec::Array(inner) => write!(f, "{inner}[]"),
            TypeSpec::Tuple(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Parses an ABI document, either a bare entry array or a build artifact
/// carrying it under `abi`, into its `function` entries in declaration
/// order. Other entry kinds are skipped.
pub fn parse_abi(json: &str) -> Result<Vec<Function>, AbiError> {
    let value: Value = serde_json::from_str(json)?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut obj) => match obj.remove("abi") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(AbiError::MissingAbi),
        },
        _ => return Err(AbiError::MissingAbi),
    };

    let mut functions = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        if let Some(function) = function_entry(index, entry)? {
            functions.push(function);
        }
    }
    Ok(functions)
}

// JsonAbi groups functions by name, so entries are read one by one to keep
// their order for collision handling and the function table.
fn function_entry(index: usize, mut entry: Value) -> Result<Option<Function>, AbiError> {
    let Some(obj) = entry.as_object_mut() else {
        return Ok(None);
    };
    match obj.get("type") {
        None | Some(Value::Null) => {}
        Some(Value::String(kind)) if kind == "function" => {}
        Some(_) => return Ok(None),
    }

    let named = obj
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty());
    if !named {
        return Err(AbiError::MissingName { index });
    }

    // a missing `type` means function; hand-written ABIs often omit the lists
    obj.insert("type".to_string(), Value::from("function"));
    obj.entry("inputs").or_insert_with(|| Value::Array(Vec::new()));
    obj.entry("outputs").or_insert_with(|| Value::Array(Vec::new()));

    serde_json::from_value(entry)
        .map(Some)
        .map_err(|source| AbiError::InvalidEntry { index, source })
}

pub fn load_abi(path: impl AsRef<Path>) -> Result<Vec<Function>, AbiError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| AbiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_abi(&content)
}
