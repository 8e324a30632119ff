// src/decoder.rs
use crate::abi::TypeSpec;
use crate::selector::{FunctionDescriptor, Selector, SelectorTable};
use alloy::primitives::{Address, I256, U256};
use std::fmt;
use thiserror::Error;

const WORD: usize = 32;
/// Offsets may point many elements at one payload, so decoded output is
/// capped at this multiple of the input length.
const BUDGET_FACTOR: usize = 4;
const MIN_BUDGET: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("length-mismatch: {params} parameters need {needed} head bytes, call data has {available}")]
    LengthMismatch {
        params: usize,
        needed: usize,
        available: usize,
    },
    #[error("word at byte {at} runs past the end of a {len}-byte region")]
    Truncated { at: usize, len: usize },
    #[error("offset {offset} points outside a {len}-byte region")]
    OffsetOutOfBounds { offset: U256, len: usize },
    #[error("length {length} exceeds the {available} bytes remaining")]
    LengthOutOfBounds { length: U256, available: usize },
    #[error("budget-exceeded: decoded values would exceed {limit} bytes")]
    BudgetExceeded { limit: usize },
}

impl DecodeError {
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::LengthMismatch { .. } => "length-mismatch",
            DecodeError::Truncated { .. } => "truncated",
            DecodeError::OffsetOutOfBounds { .. } => "offset-out-of-bounds",
            DecodeError::LengthOutOfBounds { .. } => "length-out-of-bounds",
            DecodeError::BudgetExceeded { .. } => "budget-exceeded",
        }
    }
}

/// A decoded ABI value. Fixed and dynamic arrays both decode to `Array`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    Uint(U256),
    Int(I256),
    Bool(bool),
    Address(Address),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<DecodedValue>),
    Tuple(Vec<DecodedValue>),
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Uint(v) => write!(f, "{v}"),
            DecodedValue::Int(v) => write!(f, "{v}"),
            DecodedValue::Bool(v) => write!(f, "{v}"),
            DecodedValue::Address(v) => write!(f, "{v}"),
            DecodedValue::FixedBytes(v) | DecodedValue::Bytes(v) => {
                write!(f, "0x{}", hex::encode(v))
            }
            DecodedValue::String(v) => write!(f, "{v:?}"),
            DecodedValue::Array(items) => write_joined(f, "[", items, "]"),
            DecodedValue::Tuple(items) => write_joined(f, "(", items, ")"),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: &[DecodedValue],
    close: &str,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

/// Result of decoding one call against its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    pub selector: Selector,
    pub function: FunctionDescriptor,
    pub values: Vec<DecodedValue>,
}

impl DecodedCall {
    /// `(name, type, value)` per parameter, in declaration order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &TypeSpec, &DecodedValue)> {
        self.function
            .input_names
            .iter()
            .zip(&self.function.input_types)
            .zip(&self.values)
            .map(|((name, ty), value)| (name.as_str(), ty, value))
    }
}

/// What the scanner learned about one matched transaction's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Decoded(DecodedCall),
    /// Selector missing from the ABI, or input shorter than a selector
    /// (plain value transfer hitting `receive`/`fallback`).
    UnknownSelector { selector: Option<Selector> },
    Undecodable {
        selector: Selector,
        function: FunctionDescriptor,
        error: DecodeError,
    },
}

/// Splits `input` into selector and tail, resolves the selector and
/// decodes the tail. Never fails: problems are carried in the outcome.
pub fn decode_input(table: &SelectorTable, input: &[u8]) -> CallOutcome {
    let Some((selector, tail)) = input.split_first_chunk::<4>() else {
        return CallOutcome::UnknownSelector { selector: None };
    };
    let selector = *selector;

    let Some(function) = table.lookup(selector) else {
        return CallOutcome::UnknownSelector {
            selector: Some(selector),
        };
    };

    match decode(function, tail) {
        Ok(call) => CallOutcome::Decoded(call),
        Err(error) => CallOutcome::Undecodable {
            selector,
            function: function.clone(),
            error,
        },
    }
}

/// Decodes the call data that follows the 4-byte selector.
pub fn decode(descriptor: &FunctionDescriptor, tail: &[u8]) -> Result<DecodedCall, DecodeError> {
    let needed = descriptor
        .input_types
        .iter()
        .fold(0usize, |acc, ty| acc.saturating_add(ty.head_words()))
        .saturating_mul(WORD);
    if tail.len() < needed {
        return Err(DecodeError::LengthMismatch {
            params: descriptor.input_types.len(),
            needed,
            available: tail.len(),
        });
    }

    let mut budget = Budget::for_input(tail.len());
    let values = decode_fields(descriptor.input_types.iter(), tail, 0, &mut budget)?;
    Ok(DecodedCall {
        selector: descriptor.selector,
        function: descriptor.clone(),
        values,
    })
}

/// Bytes of decoded output a single call may still produce.
struct Budget {
    limit: usize,
    remaining: usize,
}

impl Budget {
    fn for_input(len: usize) -> Self {
        let limit = len.saturating_mul(BUDGET_FACTOR).max(MIN_BUDGET);
        Self {
            limit,
            remaining: limit,
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<(), DecodeError> {
        self.remaining = self
            .remaining
            .checked_sub(bytes)
            .ok_or(DecodeError::BudgetExceeded { limit: self.limit })?;
        Ok(())
    }
}

/// Decodes a tuple-shaped sequence whose head starts at `base` within
/// `region`. Offsets of dynamic members are relative to `region`.
fn decode_fields<'a>(
    types: impl Iterator<Item = &'a TypeSpec>,
    region: &[u8],
    base: usize,
    budget: &mut Budget,
) -> Result<Vec<DecodedValue>, DecodeError> {
    let mut values = Vec::with_capacity(types.size_hint().0);
    let mut head = base;
    for ty in types {
        values.push(decode_value(ty, region, head, budget)?);
        head = head.saturating_add(ty.head_words().saturating_mul(WORD));
    }
    Ok(values)
}

fn decode_value(
    ty: &TypeSpec,
    region: &[u8],
    at: usize,
    budget: &mut Budget,
) -> Result<DecodedValue, DecodeError> {
    if !ty.is_dynamic() && ty.head_words() == 1 {
        budget.charge(WORD)?;
    }
    match ty {
        TypeSpec::Uint(bits) => {
            let word = read_uint(region, at)?;
            Ok(DecodedValue::Uint(word & low_mask(*bits)))
        }
        TypeSpec::Int(bits) => {
            let word = read_uint(region, at)?;
            Ok(DecodedValue::Int(sign_extend(word, *bits)))
        }
        TypeSpec::Bool => {
            let word = read_word(region, at)?;
            Ok(DecodedValue::Bool(word.iter().any(|b| *b != 0)))
        }
        TypeSpec::Address => {
            let word = read_word(region, at)?;
            Ok(DecodedValue::Address(Address::from_slice(&word[12..])))
        }
        TypeSpec::FixedBytes(size) => {
            let word = read_word(region, at)?;
            Ok(DecodedValue::FixedBytes(word[..*size].to_vec()))
        }
        TypeSpec::Bytes => {
            let payload = follow_offset(region, at)?;
            let bytes = read_bytes(payload)?;
            budget.charge(WORD.saturating_add(bytes.len()))?;
            Ok(DecodedValue::Bytes(bytes.to_vec()))
        }
        TypeSpec::String => {
            let payload = follow_offset(region, at)?;
            let bytes = read_bytes(payload)?;
            budget.charge(WORD.saturating_add(bytes.len()))?;
            Ok(DecodedValue::String(
                String::from_utf8_lossy(bytes).into_owned(),
            ))
        }
        TypeSpec::Array(inner) => {
            let payload = follow_offset(region, at)?;
            let len = read_length(payload)?;
            let elements = &payload[WORD..];
            ensure_fits(elements, 0, inner.head_words(), len)?;
            budget.charge(len.saturating_mul(WORD))?;
            let items = decode_fields(
                std::iter::repeat(inner.as_ref()).take(len),
                elements,
                0,
                budget,
            )?;
            Ok(DecodedValue::Array(items))
        }
        TypeSpec::FixedArray(inner, len) => {
            let (region, base) = if ty.is_dynamic() {
                (follow_offset(region, at)?, 0)
            } else {
                (region, at)
            };
            ensure_fits(region, base, inner.head_words(), *len)?;
            budget.charge(len.saturating_mul(WORD))?;
            let items = decode_fields(
                std::iter::repeat(inner.as_ref()).take(*len),
                region,
                base,
                budget,
            )?;
            Ok(DecodedValue::Array(items))
        }
        TypeSpec::Tuple(fields) => {
            let (region, base) = if ty.is_dynamic() {
                (follow_offset(region, at)?, 0)
            } else {
                (region, at)
            };
            let items = decode_fields(fields.iter(), region, base, budget)?;
            Ok(DecodedValue::Tuple(items))
        }
    }
}

fn read_word(region: &[u8], at: usize) -> Result<&[u8], DecodeError> {
    at.checked_add(WORD)
        .and_then(|end| region.get(at..end))
        .ok_or(DecodeError::Truncated {
            at,
            len: region.len(),
        })
}

fn read_uint(region: &[u8], at: usize) -> Result<U256, DecodeError> {
    read_word(region, at).map(U256::from_be_slice)
}

/// Reads the offset word at `at` and returns the region it points into.
fn follow_offset(region: &[u8], at: usize) -> Result<&[u8], DecodeError> {
    let offset = read_uint(region, at)?;
    let start = usize::try_from(offset)
        .ok()
        .filter(|start| *start <= region.len())
        .ok_or(DecodeError::OffsetOutOfBounds {
            offset,
            len: region.len(),
        })?;
    Ok(&region[start..])
}

/// Reads a length word at the start of `payload`. The caller may rely on
/// `payload` holding at least one word afterwards.
fn read_length(payload: &[u8]) -> Result<usize, DecodeError> {
    let length = read_uint(payload, 0)?;
    let available = payload.len() - WORD;
    usize::try_from(length)
        .ok()
        .filter(|len| *len <= available)
        .ok_or(DecodeError::LengthOutOfBounds { length, available })
}

fn read_bytes(payload: &[u8]) -> Result<&[u8], DecodeError> {
    let len = read_length(payload)?;
    Ok(&payload[WORD..WORD + len])
}

/// Rejects `count` elements of `words` head words each that would not fit
/// in `region` past `base`, before anything is allocated for them.
fn ensure_fits(region: &[u8], base: usize, words: usize, count: usize) -> Result<(), DecodeError> {
    let available = region.len().saturating_sub(base);
    let fits = words
        .checked_mul(count)
        .and_then(|w| w.checked_mul(WORD))
        .is_some_and(|needed| needed <= available);
    if fits {
        Ok(())
    } else {
        Err(DecodeError::LengthOutOfBounds {
            length: U256::from(count),
            available,
        })
    }
}

fn low_mask(bits: usize) -> U256 {
    if bits >= 256 {
        U256::MAX
    } else {
        (U256::from(1u8) << bits) - U256::from(1u8)
    }
}

fn sign_extend(word: U256, bits: usize) -> I256 {
    if bits >= 256 {
        return I256::from_raw(word);
    }
    let mask = low_mask(bits);
    let low = word & mask;
    if low.bit(bits - 1) {
        I256::from_raw(low | !mask)
    } else {
        I256::from_raw(low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::parse_abi;

    fn descriptor(abi: &str) -> FunctionDescriptor {
        let table = SelectorTable::build(&parse_abi(abi).unwrap()).unwrap();
        let f = table.functions().next().unwrap().clone();
        f
    }

    fn word(hex_str: &str) -> Vec<u8> {
        let bytes = hex::decode(hex_str).unwrap();
        let mut out = vec![0u8; 32 - bytes.len()];
        out.extend(bytes);
        out
    }

    #[test]
    fn decodes_transfer() {
        let f = descriptor(
            r#"[{"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"value","type":"uint256"}]}]"#,
        );
        let tail = hex::decode(
            "000000000000000000000000123456789012345678901234567890123456789000000000000000000000000000000000000000000000000000000000000003e8",
        )
        .unwrap();

        let call = decode(&f, &tail).unwrap();
        assert_eq!(call.selector, [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(
            call.values[0],
            DecodedValue::Address(
                "0x1234567890123456789012345678901234567890"
                    .parse()
                    .unwrap()
            )
        );
        assert_eq!(call.values[1], DecodedValue::Uint(U256::from(1000u64)));

        let names: Vec<_> = call.params().map(|(name, _, _)| name).collect();
        assert_eq!(names, vec!["to", "value"]);
    }

    #[test]
    fn signed_and_narrow_integers() {
        let f = descriptor(
            r#"[{"name":"f","inputs":[{"name":"a","type":"int8"},{"name":"b","type":"int8"},{"name":"c","type":"uint8"},{"name":"d","type":"int256"}]}]"#,
        );
        let mut tail = vec![0xffu8; 32]; // -1
        tail.extend(word("80")); // -128
        tail.extend(word("01ff")); // masked to 0xff
        tail.extend(vec![0xffu8; 32]);

        let call = decode(&f, &tail).unwrap();
        assert_eq!(call.values[0], DecodedValue::Int(I256::MINUS_ONE));
        assert_eq!(call.values[1], DecodedValue::Int(I256::try_from(-128i64).unwrap()));
        assert_eq!(call.values[2], DecodedValue::Uint(U256::from(255u64)));
        assert_eq!(call.values[3], DecodedValue::Int(I256::MINUS_ONE));
    }

    #[test]
    fn bool_and_fixed_bytes() {
        let f = descriptor(
            r#"[{"name":"f","inputs":[{"name":"ok","type":"bool"},{"name":"tag","type":"bytes4"}]}]"#,
        );
        let mut tail = word("02");
        let mut tag = vec![0xde, 0xad, 0xbe, 0xef];
        tag.resize(32, 0);
        tail.extend(tag);

        let call = decode(&f, &tail).unwrap();
        assert_eq!(call.values[0], DecodedValue::Bool(true));
        assert_eq!(
            call.values[1],
            DecodedValue::FixedBytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(call.values[1].to_string(), "0xdeadbeef");
    }

    #[test]
    fn short_head_is_length_mismatch() {
        let f = descriptor(
            r#"[{"name":"f","inputs":[{"name":"a","type":"uint256"},{"name":"b","type":"uint256"}]}]"#,
        );
        let err = decode(&f, &word("01")).unwrap_err();
        assert_eq!(err.reason(), "length-mismatch");
    }

    #[test]
    fn truncated_dynamic_bytes() {
        let f = descriptor(r#"[{"name":"f","inputs":[{"name":"data","type":"bytes"}]}]"#);
        let mut tail = word("20");
        tail.extend(word("40")); // claims 64 bytes
        tail.extend(vec![0xaa; 40]); // only 40 present

        let err = decode(&f, &tail).unwrap_err();
        assert_eq!(
            err,
            DecodeError::LengthOutOfBounds {
                length: U256::from(64u64),
                available: 40
            }
        );
    }

    #[test]
    fn offset_outside_tail() {
        let f = descriptor(r#"[{"name":"f","inputs":[{"name":"s","type":"string"}]}]"#);
        let err = decode(&f, &word("ffff")).unwrap_err();
        assert_eq!(err.reason(), "offset-out-of-bounds");

        let mut huge = vec![0xffu8; 32];
        huge[0] = 0x7f;
        let err = decode(&f, &huge).unwrap_err();
        assert_eq!(err.reason(), "offset-out-of-bounds");
    }

    #[test]
    fn absurd_array_length_is_rejected_before_allocation() {
        let f = descriptor(r#"[{"name":"f","inputs":[{"name":"xs","type":"uint256[]"}]}]"#);
        let mut tail = word("20");
        tail.extend(word("ffffffffffffffff"));
        let err = decode(&f, &tail).unwrap_err();
        assert_eq!(err.reason(), "length-out-of-bounds");
    }

    #[test]
    fn aliased_offsets_exhaust_the_budget() {
        let f = descriptor(r#"[{"name":"multicall","inputs":[{"name":"data","type":"bytes[]"}]}]"#);
        let count = 2000usize;
        let payload_len = 64 * 1024;
        let mut tail = word("20");
        tail.extend(word(&format!("{count:08x}")));
        // every element points at the same payload after the offset words
        for _ in 0..count {
            tail.extend(word(&format!("{:08x}", count * 32)));
        }
        tail.extend(word(&format!("{payload_len:08x}")));
        tail.extend(vec![0xab; payload_len]);

        let err = decode(&f, &tail).unwrap_err();
        assert_eq!(err.reason(), "budget-exceeded");
        assert!(matches!(err, DecodeError::BudgetExceeded { limit } if limit == tail.len() * 4));
    }

    #[test]
    fn large_distinct_payload_fits_the_budget() {
        let f = descriptor(r#"[{"name":"f","inputs":[{"name":"data","type":"bytes"}]}]"#);
        let payload_len = 200 * 1024;
        let mut tail = word("20");
        tail.extend(word(&format!("{payload_len:08x}")));
        tail.extend(vec![0x01; payload_len]);

        let call = decode(&f, &tail).unwrap();
        assert_eq!(call.values, vec![DecodedValue::Bytes(vec![0x01; payload_len])]);
    }

    #[test]
    fn decode_input_outcomes() {
        let abi = r#"[{"name":"poke","inputs":[{"name":"x","type":"uint256"}]}]"#;
        let table = SelectorTable::build(&parse_abi(abi).unwrap()).unwrap();
        let selector = table.functions().next().unwrap().selector;

        assert_eq!(
            decode_input(&table, &[]),
            CallOutcome::UnknownSelector { selector: None }
        );
        assert_eq!(
            decode_input(&table, &[0xde, 0xad, 0xbe, 0xef]),
            CallOutcome::UnknownSelector {
                selector: Some([0xde, 0xad, 0xbe, 0xef])
            }
        );

        let mut input = selector.to_vec();
        assert!(matches!(
            decode_input(&table, &input),
            CallOutcome::Undecodable { ref error, .. } if error.reason() == "length-mismatch"
        ));

        input.extend(word("2a"));
        match decode_input(&table, &input) {
            CallOutcome::Decoded(call) => {
                assert_eq!(call.function.name, "poke");
                assert_eq!(call.values, vec![DecodedValue::Uint(U256::from(42u64))]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn renders_nested_values() {
        let value = DecodedValue::Array(vec![
            DecodedValue::Tuple(vec![
                DecodedValue::Uint(U256::from(7u64)),
                DecodedValue::String("hi".into()),
            ]),
            DecodedValue::Tuple(vec![
                DecodedValue::Uint(U256::ZERO),
                DecodedValue::String(String::new()),
            ]),
        ]);
        assert_eq!(value.to_string(), r#"[(7, "hi"), (0, "")]"#);
    }
}
