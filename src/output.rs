// src/output.rs
use crate::decoder::{CallOutcome, DecodedValue};
use crate::models::{BlockSummary, TxSummary};
use crate::selector::SelectorTable;
use chrono::DateTime;
use clap::ValueEnum;
use serde_json::{json, Value};
use std::fmt::Write;

pub const VERBOSITY_LOW: u8 = 1;
pub const VERBOSITY_MEDIUM: u8 = 2;
pub const VERBOSITY_HIGH: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Console,
    Json,
}

/// Turns `Matched` payloads into printable text.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    format: OutputFormat,
    verbosity: u8,
}

impl Renderer {
    pub fn new(format: OutputFormat, verbosity: u8) -> Self {
        Self { format, verbosity }
    }

    pub fn render(&self, block: &BlockSummary, tx: &TxSummary, call: &CallOutcome) -> String {
        match self.format {
            OutputFormat::Console => console(block, tx, call, self.verbosity),
            OutputFormat::Json => matched_json(block, tx, call).to_string(),
        }
    }
}

fn console(block: &BlockSummary, tx: &TxSummary, call: &CallOutcome, verbosity: u8) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "Tx: {}", tx.hash);
    let _ = writeln!(out, "   Block: {}", block.number);
    if verbosity > VERBOSITY_LOW {
        let _ = writeln!(out, "   Time: \t{}", utc_time(block.timestamp));
        let _ = writeln!(out, "   Miner: \t{}", block.miner);
    }
    let _ = writeln!(out, "   From: \t{}", tx.from);

    match call {
        CallOutcome::Decoded(decoded) => {
            let _ = writeln!(out, "   Function: \t{}", decoded.function.name);
            let _ = writeln!(out, "   Params \t[{}] {{", decoded.function.type_list());
            for (idx, (name, _, value)) in decoded.params().enumerate() {
                if name.is_empty() {
                    let _ = writeln!(out, "       #{idx}: {value}");
                } else {
                    let _ = writeln!(out, "       #{idx} {name}: {value}");
                }
            }
            let _ = write!(out, "   }}");
        }
        CallOutcome::UnknownSelector { selector } => {
            let selector = selector
                .map(|s| format!("0x{}", hex::encode(s)))
                .unwrap_or_else(|| "none".to_string());
            let _ = write!(out, "   Function: \t<unknown selector {selector}>");
        }
        CallOutcome::Undecodable {
            function, error, ..
        } => {
            let _ = writeln!(out, "   Function: \t{}", function.name);
            let _ = write!(
                out,
                "   Params \t[{}] <undecodable: {}>",
                function.type_list(),
                error
            );
        }
    }
    out
}

/// `Tue, 14 Nov 2023 22:13:20 GMT`, as browsers print UTC dates.
fn utc_time(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Function name, selector and input types of every ABI function.
pub fn function_table(table: &SelectorTable) -> String {
    let header = ["Functions", "SHA3(signature)", "Input arguments"];
    let rows: Vec<[String; 3]> = table
        .functions()
        .map(|f| {
            let types = f.type_list();
            [
                f.name.clone(),
                f.selector_hex(),
                if types.is_empty() { "-".to_string() } else { types },
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let line = |out: &mut String, cells: [&str; 3]| {
        let _ = writeln!(
            out,
            "│ {:<w0$} │ {:<w1$} │ {:<w2$} │",
            cells[0],
            cells[1],
            cells[2],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2]
        );
    };
    line(&mut out, header);
    let _ = writeln!(
        out,
        "├{}┼{}┼{}┤",
        "─".repeat(widths[0] + 2),
        "─".repeat(widths[1] + 2),
        "─".repeat(widths[2] + 2)
    );
    for row in &rows {
        line(&mut out, [row[0].as_str(), row[1].as_str(), row[2].as_str()]);
    }
    out
}

pub fn matched_json(block: &BlockSummary, tx: &TxSummary, call: &CallOutcome) -> Value {
    let call = match call {
        CallOutcome::Decoded(decoded) => {
            let params: Vec<Value> = decoded
                .params()
                .map(|(name, ty, value)| {
                    json!({
                        "name": name,
                        "type": ty.to_string(),
                        "value": value_json(value),
                    })
                })
                .collect();
            json!({
                "status": "decoded",
                "selector": decoded.function.selector_hex(),
                "function": decoded.function.name,
                "signature": decoded.function.signature(),
                "params": params,
            })
        }
        CallOutcome::UnknownSelector { selector } => {
            let selector_hex = selector.map(|s| format!("0x{}", hex::encode(s)));
            json!({
                "status": "unknown-selector",
                "selector": selector_hex,
            })
        }
        CallOutcome::Undecodable {
            function, error, ..
        } => json!({
            "status": "undecodable",
            "selector": function.selector_hex(),
            "function": function.name,
            "signature": function.signature(),
            "reason": error.reason(),
            "error": error.to_string(),
        }),
    };

    json!({
        "block": {
            "number": block.number,
            "timestamp": block.timestamp,
            "miner": block.miner.to_string(),
        },
        "tx": tx.raw,
        "call": call,
    })
}

/// Integers become decimal strings so no precision is lost in JSON.
pub fn value_json(value: &DecodedValue) -> Value {
    match value {
        DecodedValue::Uint(v) => Value::String(v.to_string()),
        DecodedValue::Int(v) => Value::String(v.to_string()),
        DecodedValue::Bool(v) => Value::Bool(*v),
        DecodedValue::Address(v) => Value::String(v.to_string()),
        DecodedValue::FixedBytes(v) | DecodedValue::Bytes(v) => {
            Value::String(format!("0x{}", hex::encode(v)))
        }
        DecodedValue::String(v) => Value::String(v.clone()),
        DecodedValue::Array(items) | DecodedValue::Tuple(items) => {
            Value::Array(items.iter().map(value_json).collect())
        }
    }
}
