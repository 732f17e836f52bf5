//! Call-data encoding against an ABI schema
//!
//! The default schema is parsed once at startup; individual requests may
//! carry their own ABI override.

use crate::error::{PoolError, PoolResult};

use ethers::abi::{Abi, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Load an ABI schema from a JSON file.
pub fn load_abi(path: &Path) -> PoolResult<Arc<Abi>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PoolError::Config(format!("failed to read ABI {:?}: {}", path, e)))?;
    let abi: Abi = serde_json::from_str(&raw)
        .map_err(|e| PoolError::Config(format!("failed to parse ABI {:?}: {}", path, e)))?;
    Ok(Arc::new(abi))
}

/// Encode a function call into call data.
pub fn encode_call(abi: &Abi, function: &str, args: &[Token]) -> PoolResult<Bytes> {
    let function = abi.function(function).map_err(|e| PoolError::Encode {
        function: function.to_string(),
        message: e.to_string(),
    })?;

    let data = function
        .encode_input(args)
        .map_err(|e| PoolError::Encode {
            function: function.name.clone(),
            message: e.to_string(),
        })?;

    Ok(Bytes::from(data))
}

/// Coerce JSON values into ABI tokens for a named function.
///
/// Used by the HTTP enqueue endpoint, where arguments arrive as JSON
/// rather than pre-built tokens.
pub fn coerce_args(abi: &Abi, function: &str, values: &[Value]) -> PoolResult<Vec<Token>> {
    let function = abi.function(function).map_err(|e| PoolError::Encode {
        function: function.to_string(),
        message: e.to_string(),
    })?;

    if function.inputs.len() != values.len() {
        return Err(PoolError::Args(format!(
            "{} expects {} arguments, got {}",
            function.name,
            function.inputs.len(),
            values.len()
        )));
    }

    function
        .inputs
        .iter()
        .zip(values)
        .map(|(param, value)| coerce_token(&param.kind, value))
        .collect()
}

fn coerce_token(kind: &ParamType, value: &Value) -> PoolResult<Token> {
    match kind {
        ParamType::Address => {
            let text = expect_str(value)?;
            let address: Address = text
                .parse()
                .map_err(|e| PoolError::Args(format!("invalid address {}: {}", text, e)))?;
            Ok(Token::Address(address))
        }
        ParamType::Uint(_) => Ok(Token::Uint(coerce_u256(value)?)),
        ParamType::Int(_) => Ok(Token::Int(coerce_u256(value)?)),
        ParamType::Bool => value
            .as_bool()
            .map(Token::Bool)
            .ok_or_else(|| PoolError::Args(format!("expected bool, got {}", value))),
        ParamType::String => Ok(Token::String(expect_str(value)?.to_string())),
        ParamType::Bytes => Ok(Token::Bytes(coerce_bytes(value)?)),
        ParamType::FixedBytes(len) => {
            let bytes = coerce_bytes(value)?;
            if bytes.len() != *len {
                return Err(PoolError::Args(format!(
                    "expected {} bytes, got {}",
                    len,
                    bytes.len()
                )));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Array(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| PoolError::Args(format!("expected array, got {}", value)))?;
            let tokens = items
                .iter()
                .map(|item| coerce_token(inner, item))
                .collect::<PoolResult<Vec<_>>>()?;
            Ok(Token::Array(tokens))
        }
        ParamType::FixedArray(inner, len) => {
            let items = value
                .as_array()
                .ok_or_else(|| PoolError::Args(format!("expected array, got {}", value)))?;
            if items.len() != *len {
                return Err(PoolError::Args(format!(
                    "expected {} elements, got {}",
                    len,
                    items.len()
                )));
            }
            let tokens = items
                .iter()
                .map(|item| coerce_token(inner, item))
                .collect::<PoolResult<Vec<_>>>()?;
            Ok(Token::FixedArray(tokens))
        }
        ParamType::Tuple(kinds) => {
            let items = value
                .as_array()
                .ok_or_else(|| PoolError::Args(format!("expected tuple array, got {}", value)))?;
            if items.len() != kinds.len() {
                return Err(PoolError::Args(format!(
                    "expected {} tuple elements, got {}",
                    kinds.len(),
                    items.len()
                )));
            }
            let tokens = kinds
                .iter()
                .zip(items)
                .map(|(kind, item)| coerce_token(kind, item))
                .collect::<PoolResult<Vec<_>>>()?;
            Ok(Token::Tuple(tokens))
        }
    }
}

fn expect_str(value: &Value) -> PoolResult<&str> {
    value
        .as_str()
        .ok_or_else(|| PoolError::Args(format!("expected string, got {}", value)))
}

fn coerce_u256(value: &Value) -> PoolResult<U256> {
    match value {
        Value::Number(n) => {
            let n = n
                .as_u64()
                .ok_or_else(|| PoolError::Args(format!("expected unsigned integer, got {}", n)))?;
            Ok(U256::from(n))
        }
        Value::String(text) => {
            if let Some(hex_digits) = text.strip_prefix("0x") {
                U256::from_str_radix(hex_digits, 16)
                    .map_err(|e| PoolError::Args(format!("invalid hex integer {}: {}", text, e)))
            } else {
                U256::from_dec_str(text)
                    .map_err(|e| PoolError::Args(format!("invalid integer {}: {}", text, e)))
            }
        }
        other => Err(PoolError::Args(format!("expected integer, got {}", other))),
    }
}

fn coerce_bytes(value: &Value) -> PoolResult<Vec<u8>> {
    let text = expect_str(value)?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits).map_err(|e| PoolError::Args(format!("invalid hex bytes {}: {}", text, e)))
}

/// Parse a JSON hash value (e.g. a `eth_sendRawTransaction` response).
pub fn parse_hash(value: &Value) -> PoolResult<H256> {
    serde_json::from_value(value.clone())
        .map_err(|e| PoolError::ReceiptParse(format!("invalid hash {}: {}", value, e)))
}
