//! QLDB commit-digest computation.
//!
//! QLDB rejects a commit unless the client sends the digest of everything it
//! executed in the transaction. The digest chains Ion hashes (SHA-256) of the
//! transaction id, each statement, and each statement parameter:
//!
//! ```text
//! txn   = H(txn_id)
//! stmt  = H(statement) . H(param_1) . H(param_2) ...
//! txn   = txn . stmt          (for every statement, in order)
//! ```
//!
//! `a . b` concatenates the two hashes, smaller first under a signed-byte
//! comparison that starts from the last byte, and hashes the result.
//!
//! Parameters are JSON values sent as Ion text; only the value kinds whose Ion
//! text parse is unambiguous are hashed. Floats are rejected because the
//! server parses `1.5` as an Ion decimal.

use crate::LedgerError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

const BEGIN_MARKER: u8 = 0x0B;
const END_MARKER: u8 = 0x0E;
const ESCAPE: u8 = 0x0C;

const TQ_NULL: u8 = 0x0F;
const TQ_BOOL: u8 = 0x10;
const TQ_POS_INT: u8 = 0x20;
const TQ_NEG_INT: u8 = 0x30;
const TQ_SYMBOL: u8 = 0x70;
const TQ_STRING: u8 = 0x80;
const TQ_LIST: u8 = 0xB0;
const TQ_STRUCT: u8 = 0xD0;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct QldbHash([u8; 32]);

impl std::fmt::Debug for QldbHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl QldbHash {
    /// Hash of `text` as an Ion string.
    pub fn of_str(text: &str) -> Self {
        let mut buf = Vec::with_capacity(text.len() + 3);
        scalar(&mut buf, TQ_STRING, text.as_bytes());
        Self(sha256(&buf))
    }

    /// Hash of `value` as the Ion value its JSON text parses to.
    pub fn of_value(value: &Value) -> Result<Self, LedgerError> {
        let mut buf = Vec::new();
        serialize(value, &mut buf)?;
        Ok(Self(sha256(&buf)))
    }

    #[must_use]
    pub fn dot(&self, other: &QldbHash) -> QldbHash {
        let (first, second) = if compare(&self.0, &other.0) == Ordering::Less {
            (self, other)
        } else {
            (other, self)
        };
        let mut hasher = Sha256::new();
        hasher.update(first.0);
        hasher.update(second.0);
        QldbHash(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn compare(a: &[u8; 32], b: &[u8; 32]) -> Ordering {
    for i in (0..32).rev() {
        let ord = (a[i] as i8).cmp(&(b[i] as i8));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if matches!(b, BEGIN_MARKER | END_MARKER | ESCAPE) {
            out.push(ESCAPE);
        }
        out.push(b);
    }
}

fn scalar(out: &mut Vec<u8>, type_qualifier: u8, representation: &[u8]) {
    out.push(BEGIN_MARKER);
    out.push(type_qualifier);
    escape_into(out, representation);
    out.push(END_MARKER);
}

/// Big-endian magnitude without leading zero bytes; zero is empty.
fn magnitude(n: u64) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

fn serialize(value: &Value, out: &mut Vec<u8>) -> Result<(), LedgerError> {
    match value {
        Value::Null => scalar(out, TQ_NULL, &[]),
        Value::Bool(b) => scalar(out, TQ_BOOL | u8::from(*b), &[]),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                scalar(out, TQ_POS_INT, &magnitude(u));
            } else if let Some(i) = n.as_i64() {
                scalar(out, TQ_NEG_INT, &magnitude(i.unsigned_abs()));
            } else {
                return Err(LedgerError::UnsupportedValue(format!(
                    "non-integer number {n}; send decimals as strings"
                )));
            }
        }
        Value::String(s) => scalar(out, TQ_STRING, s.as_bytes()),
        Value::Array(items) => {
            out.push(BEGIN_MARKER);
            out.push(TQ_LIST);
            for item in items {
                serialize(item, out)?;
            }
            out.push(END_MARKER);
        }
        Value::Object(fields) => {
            let mut field_hashes = Vec::with_capacity(fields.len());
            for (name, field_value) in fields {
                let mut buf = Vec::new();
                scalar(&mut buf, TQ_SYMBOL, name.as_bytes());
                serialize(field_value, &mut buf)?;
                field_hashes.push(sha256(&buf));
            }
            field_hashes.sort_unstable();
            let concatenated = field_hashes.concat();
            out.push(BEGIN_MARKER);
            out.push(TQ_STRUCT);
            escape_into(out, &concatenated);
            out.push(END_MARKER);
        }
    }
    Ok(())
}
