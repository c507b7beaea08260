use std::time::Duration;
use serde_json::Value;

use crate::error::EncodeError;
use crate::frame::operand::Operand;

/// Encodes `text` as Latin-1. Characters above U+00FF have no single-byte form.
fn encode_text(index: usize, text: &str, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    for ch in text.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return Err(EncodeError::InvalidOperand {
                index,
                reason: format!("character '{}' (U+{:04X}) has no single-byte encoding", ch, code),
            });
        }
        out.push(code as u8);
    }
    Ok(())
}

/// Concatenates the encoding of every operand, in order. Either the whole frame is produced or
/// nothing is.
pub fn encode(operands: &[Operand]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(operands.len());

    for (index, operand) in operands.iter().enumerate() {
        match operand {
            Operand::Int(value) => out.push(*value as u8), // low byte
            Operand::Bool(flag) => out.push(u8::from(*flag)),
            Operand::Text(text) => encode_text(index, text, &mut out)?,
            Operand::Block(bytes) => out.extend_from_slice(bytes),
        }
    }

    Ok(out)
}

fn operand_from_json(index: usize, value: &Value) -> Result<Operand, EncodeError> {
    let invalid = |reason: String| EncodeError::InvalidOperand { index, reason };

    match value {
        Value::Bool(flag) => Ok(Operand::Bool(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(value) => Ok(Operand::Int(value)),
            None => Err(invalid(format!("{} is not an integer", number))),
        },
        Value::String(text) => Ok(Operand::Text(text.clone())),
        Value::Array(items) => {
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                match item.as_u64().and_then(|value| u8::try_from(value).ok()) {
                    Some(byte) => bytes.push(byte),
                    None => return Err(invalid(format!("byte block contains {}", item))),
                }
            }
            Ok(Operand::Block(bytes))
        },
        Value::Null => Err(invalid("null is not an operand".to_string())),
        Value::Object(_) => Err(invalid("an object is not an operand".to_string())),
    }
}

/// Reads a JSON array of operands: integers, booleans, strings and arrays of bytes.
/// Any other kind of item rejects the whole frame.
pub fn operands_from_json(value: &Value) -> Result<Vec<Operand>, EncodeError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(EncodeError::InvalidOperand {
                index: 0,
                reason: format!("expected an array of operands, got {}", other),
            });
        },
    };

    items.iter()
        .enumerate()
        .map(|(index, item)| operand_from_json(index, item))
        .collect()
}

/// Elapsed milliseconds, right aligned in a field of five with `_` as padding: `"__523"`.
/// Longer values are not truncated.
pub fn format_elapsed_ms(elapsed: Duration) -> String {
    format!("{:>5}", elapsed.as_millis()).replace(' ', "_")
}

/// Append-only frame under construction.
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    operands: Vec<Operand>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte(mut self, value: u8) -> Self {
        self.operands.push(Operand::from(value));
        self
    }

    pub fn bytes(mut self, values: &[u8]) -> Self {
        self.operands.extend(values.iter().map(|value| Operand::from(*value)));
        self
    }

    pub fn flag(mut self, value: bool) -> Self {
        self.operands.push(Operand::Bool(value));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.operands.push(Operand::Text(text.into()));
        self
    }

    pub fn block(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.operands.push(Operand::Block(bytes.into()));
        self
    }

    pub fn operand(mut self, operand: Operand) -> Self {
        self.operands.push(operand);
        self
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn finish(&self) -> Result<Vec<u8>, EncodeError> {
        encode(&self.operands)
    }
}
