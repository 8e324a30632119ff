// src/selector.rs
use crate::abi::{AbiError, TypeSpec};
use alloy::json_abi::Function;
use alloy::primitives::keccak256;
use std::collections::HashMap;
use tracing::{debug, warn};

pub type Selector = [u8; 4];

/// Decode descriptor for one ABI function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub input_types: Vec<TypeSpec>,
    pub input_names: Vec<String>, // same length as input_types, may be empty strings
    pub selector: Selector,
}

impl FunctionDescriptor {
    pub fn from_function(function: &Function) -> Result<Self, AbiError> {
        let name = function.name.trim().to_string();

        let mut input_types = Vec::with_capacity(function.inputs.len());
        let mut input_names = Vec::with_capacity(function.inputs.len());
        for param in &function.inputs {
            let ty = TypeSpec::from_param(param).ok_or_else(|| AbiError::UnknownType {
                function: name.clone(),
                ty: param.selector_type().into_owned(),
            })?;
            input_types.push(ty);
            input_names.push(param.name.clone());
        }

        let selector = compute_selector(&canonical_signature(&name, &input_types));
        Ok(Self {
            name,
            input_types,
            input_names,
            selector,
        })
    }

    /// `transfer(address,uint256)`
    pub fn signature(&self) -> String {
        canonical_signature(&self.name, &self.input_types)
    }

    /// Comma-separated input types, without the function name.
    pub fn type_list(&self) -> String {
        self.input_types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn selector_hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector))
    }
}

pub fn canonical_signature(name: &str, types: &[TypeSpec]) -> String {
    let types: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("{}({})", name, types.join(","))
}

pub fn compute_selector(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Immutable selector → descriptor lookup built from one ABI.
#[derive(Debug, Clone, Default)]
pub struct SelectorTable {
    functions: HashMap<Selector, FunctionDescriptor>,
    order: Vec<Selector>,
}

impl SelectorTable {
    /// Builds the table from ABI functions in declaration order. On a
    /// selector collision the later entry replaces the earlier one.
    pub fn build(functions: &[Function]) -> Result<Self, AbiError> {
        let mut table = SelectorTable::default();

        for function in functions {
            let descriptor = FunctionDescriptor::from_function(function)?;
            debug!(
                "selector {} => {}",
                descriptor.selector_hex(),
                descriptor.signature()
            );

            let selector = descriptor.selector;
            match table.functions.insert(selector, descriptor) {
                Some(previous) => warn!(
                    "selector collision {}: {} replaced by {}",
                    previous.selector_hex(),
                    previous.signature(),
                    table.functions[&selector].signature()
                ),
                None => table.order.push(selector),
            }
        }

        Ok(table)
    }

    pub fn lookup(&self, selector: Selector) -> Option<&FunctionDescriptor> {
        self.functions.get(&selector)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Descriptors in ABI declaration order (first appearance of each selector).
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDescriptor> {
        self.order.iter().filter_map(|s| self.functions.get(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::parse_abi;

    const ERC20: &str = r#"[
        {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"value","type":"uint256"}]},
        {"type":"function","name":"approve","inputs":[{"name":"spender","type":"address"},{"name":"value","type":"uint256"}]},
        {"type":"event","name":"Transfer","inputs":[{"name":"from","type":"address"}]},
        {"type":"constructor","inputs":[]}
    ]"#;

    #[test]
    fn known_selectors() {
        assert_eq!(
            compute_selector("transfer(address,uint256)"),
            [0xa9, 0x05, 0x9c, 0xbb]
        );
        assert_eq!(
            compute_selector("approve(address,uint256)"),
            [0x09, 0x5e, 0xa7, 0xb3]
        );
    }

    #[test]
    fn builds_only_functions() {
        let table = SelectorTable::build(&parse_abi(ERC20).unwrap()).unwrap();
        assert_eq!(table.len(), 2);

        let transfer = table.lookup([0xa9, 0x05, 0x9c, 0xbb]).unwrap();
        assert_eq!(transfer.name, "transfer");
        assert_eq!(transfer.input_names, vec!["to", "value"]);
        assert_eq!(transfer.type_list(), "address,uint256");
        assert!(table.lookup([0xde, 0xad, 0xbe, 0xef]).is_none());

        let names: Vec<_> = table.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["transfer", "approve"]);
    }

    #[test]
    fn deterministic_across_builds() {
        let entries = parse_abi(ERC20).unwrap();
        let a = SelectorTable::build(&entries).unwrap();
        let b = SelectorTable::build(&entries).unwrap();
        let a: Vec<_> = a.functions().cloned().collect();
        let b: Vec<_> = b.functions().cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn tuple_inputs_use_expanded_signature() {
        let abi = r#"[{"type":"function","name":"fill","inputs":[
            {"name":"order","type":"tuple","components":[{"name":"maker","type":"address"},{"name":"amount","type":"uint256"}]},
            {"name":"sig","type":"bytes"}
        ]}]"#;
        let table = SelectorTable::build(&parse_abi(abi).unwrap()).unwrap();
        let f = table.functions().next().unwrap();
        assert_eq!(f.signature(), "fill((address,uint256),bytes)");
        assert_eq!(f.selector, compute_selector("fill((address,uint256),bytes)"));
    }

    #[test]
    fn later_entry_wins_on_collision() {
        let abi = r#"[
            {"type":"function","name":"transfer","inputs":[{"name":"a","type":"address"},{"name":"b","type":"uint256"}]},
            {"type":"function","name":"transfer","inputs":[{"name":"dst","type":"address"},{"name":"wad","type":"uint"}]}
        ]"#;
        let table = SelectorTable::build(&parse_abi(abi).unwrap()).unwrap();
        assert_eq!(table.len(), 1);
        let f = table.lookup([0xa9, 0x05, 0x9c, 0xbb]).unwrap();
        assert_eq!(f.input_names, vec!["dst", "wad"]);
        assert_eq!(table.functions().count(), 1);
    }

    #[test]
    fn unknown_types_fail() {
        let bad_type = r#"[{"type":"function","name":"f","inputs":[{"name":"x","type":"uint257"}]}]"#;
        assert!(matches!(
            SelectorTable::build(&parse_abi(bad_type).unwrap()),
            Err(AbiError::UnknownType { ref ty, .. }) if ty == "uint257"
        ));

        let callback = r#"[{"type":"function","name":"f","inputs":[{"name":"cb","type":"function"}]}]"#;
        assert!(matches!(
            SelectorTable::build(&parse_abi(callback).unwrap()),
            Err(AbiError::UnknownType { .. })
        ));
    }

    #[test]
    fn selectors_agree_with_json_abi() {
        let abi = r#"[
            {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"value","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]},
            {"type":"function","name":"fill","inputs":[
                {"name":"orders","type":"tuple[]","components":[{"name":"maker","type":"address"},{"name":"amounts","type":"uint256[2]"}]},
                {"name":"sig","type":"bytes"}
            ],"outputs":[]},
            {"type":"function","name":"batch","inputs":[{"name":"calls","type":"bytes[]"},{"name":"flags","type":"bool[3]"}],"outputs":[]}
        ]"#;
        let functions = parse_abi(abi).unwrap();
        let table = SelectorTable::build(&functions).unwrap();

        for function in &functions {
            let descriptor = table.lookup(function.selector().0).unwrap();
            assert_eq!(descriptor.signature(), function.signature());
        }
    }
}
