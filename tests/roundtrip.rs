use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, B256, I256, U256};
use contract_tracer::{
    abi::parse_abi,
    decoder::{decode, decode_input, CallOutcome, DecodeError, DecodedValue},
    selector::{FunctionDescriptor, SelectorTable},
};
use serde_json::json;

fn table(types: &[&str]) -> SelectorTable {
    let inputs: Vec<_> = types
        .iter()
        .enumerate()
        .map(|(i, ty)| json!({ "name": format!("arg{i}"), "type": ty }))
        .collect();
    let abi = json!([{ "type": "function", "name": "call", "inputs": inputs }]);
    SelectorTable::build(&parse_abi(&abi.to_string()).unwrap()).unwrap()
}

fn descriptor(types: &[&str]) -> FunctionDescriptor {
    table(types).functions().next().unwrap().clone()
}

/// What the decoder is expected to produce for a reference-encoded value.
fn expected(value: &DynSolValue) -> DecodedValue {
    match value {
        DynSolValue::Uint(v, _) => DecodedValue::Uint(*v),
        DynSolValue::Int(v, _) => DecodedValue::Int(*v),
        DynSolValue::Bool(v) => DecodedValue::Bool(*v),
        DynSolValue::Address(v) => DecodedValue::Address(*v),
        DynSolValue::FixedBytes(bytes, size) => DecodedValue::FixedBytes(bytes[..*size].to_vec()),
        DynSolValue::Bytes(v) => DecodedValue::Bytes(v.clone()),
        DynSolValue::String(v) => DecodedValue::String(v.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            DecodedValue::Array(items.iter().map(expected).collect())
        }
        DynSolValue::Tuple(items) => DecodedValue::Tuple(items.iter().map(expected).collect()),
        other => panic!("unsupported reference value {other:?}"),
    }
}

fn assert_roundtrip(types: &[&str], values: Vec<DynSolValue>) {
    let table = table(types);
    let function = table.functions().next().unwrap();
    let want: Vec<DecodedValue> = values.iter().map(expected).collect();
    let encoded = DynSolValue::Tuple(values).abi_encode_params();

    let call = decode(function, &encoded).unwrap();
    assert_eq!(call.values, want, "types {types:?}");

    let mut input = function.selector.to_vec();
    input.extend_from_slice(&encoded);
    assert!(matches!(decode_input(&table, &input), CallOutcome::Decoded(c) if c.values == want));
}

fn word(bytes: &[u8]) -> B256 {
    let mut word = B256::ZERO;
    word[..bytes.len()].copy_from_slice(bytes);
    word
}

#[test]
fn static_types() {
    assert_roundtrip(
        &["uint8", "int16", "bool", "address", "bytes4", "uint256", "int256"],
        vec![
            DynSolValue::Uint(U256::from(200), 8),
            DynSolValue::Int(I256::from_dec_str("-5").unwrap(), 16),
            DynSolValue::Bool(true),
            DynSolValue::Address(Address::repeat_byte(0x42)),
            DynSolValue::FixedBytes(word(&[0xde, 0xad, 0xbe, 0xef]), 4),
            DynSolValue::Uint(U256::MAX, 256),
            DynSolValue::Int(I256::MIN, 256),
        ],
    );
}

#[test]
fn dynamic_types() {
    assert_roundtrip(
        &["bytes", "string", "uint256[]", "string[]"],
        vec![
            DynSolValue::Bytes((0u8..70).collect()),
            DynSolValue::String("héllo, world".to_string()),
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1), 256),
                DynSolValue::Uint(U256::from(2), 256),
                DynSolValue::Uint(U256::from(3), 256),
            ]),
            DynSolValue::Array(vec![
                DynSolValue::String(String::new()),
                DynSolValue::String("a".repeat(40)),
            ]),
        ],
    );
}

#[test]
fn empty_dynamic_values() {
    assert_roundtrip(
        &["bytes", "address[]", "string"],
        vec![
            DynSolValue::Bytes(Vec::new()),
            DynSolValue::Array(Vec::new()),
            DynSolValue::String(String::new()),
        ],
    );
}

#[test]
fn fixed_arrays_and_static_tuples() {
    assert_roundtrip(
        &["bytes32[2]", "(address,uint8)", "uint16[3]"],
        vec![
            DynSolValue::FixedArray(vec![
                DynSolValue::FixedBytes(B256::repeat_byte(0x01), 32),
                DynSolValue::FixedBytes(B256::repeat_byte(0x02), 32),
            ]),
            DynSolValue::Tuple(vec![
                DynSolValue::Address(Address::repeat_byte(0x07)),
                DynSolValue::Uint(U256::from(9), 8),
            ]),
            DynSolValue::FixedArray(vec![
                DynSolValue::Uint(U256::from(1), 16),
                DynSolValue::Uint(U256::from(65535), 16),
                DynSolValue::Uint(U256::ZERO, 16),
            ]),
        ],
    );
}

#[test]
fn nested_dynamic_structures() {
    let order = |id: u64, memo: &str| {
        DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(id), 256),
            DynSolValue::String(memo.to_string()),
        ])
    };
    assert_roundtrip(
        &["(uint256,string)[]", "uint256[][]", "(address,bytes)[2]", "bool"],
        vec![
            DynSolValue::Array(vec![order(1, "first"), order(2, "")]),
            DynSolValue::Array(vec![
                DynSolValue::Array(vec![DynSolValue::Uint(U256::from(7), 256)]),
                DynSolValue::Array(Vec::new()),
            ]),
            DynSolValue::FixedArray(vec![
                DynSolValue::Tuple(vec![
                    DynSolValue::Address(Address::ZERO),
                    DynSolValue::Bytes(vec![1, 2, 3]),
                ]),
                DynSolValue::Tuple(vec![
                    DynSolValue::Address(Address::repeat_byte(0xff)),
                    DynSolValue::Bytes(vec![0; 33]),
                ]),
            ]),
            DynSolValue::Bool(false),
        ],
    );
}

#[test]
fn truncated_reference_encoding_is_rejected() {
    let function = descriptor(&["string"]);
    let encoded = DynSolValue::Tuple(vec![DynSolValue::String("a".repeat(64))]).abi_encode_params();

    // head intact, string body cut short
    let err = decode(&function, &encoded[..encoded.len() - 40]).unwrap_err();
    assert!(matches!(err, DecodeError::LengthOutOfBounds { .. }), "{err:?}");

    let err = decode(&function, &encoded[..16]).unwrap_err();
    assert_eq!(err.reason(), "length-mismatch");
}
