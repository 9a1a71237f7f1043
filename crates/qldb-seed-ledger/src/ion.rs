//! Decoding of the Ion binary values QLDB returns in result pages.
//!
//! Values map onto JSON the way Ion's down-converting JSON writer does:
//! decimals and timestamps become their Ion text, symbols their text, blobs
//! base64 strings and clobs strings of their bytes. Sexps read as lists and
//! annotations are dropped. Shared symbol table imports are not supported.

use crate::LedgerError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{NaiveDate, TimeDelta};
use serde_json::{Map, Number, Value};

const IVM: [u8; 4] = [0xE0, 0x01, 0x00, 0xEA];

const SYSTEM_SYMBOLS: [&str; 9] = [
    "$ion",
    "$ion_1_0",
    "$ion_symbol_table",
    "name",
    "version",
    "imports",
    "symbols",
    "max_id",
    "$ion_shared_symbol_table",
];
const SID_ION_SYMBOL_TABLE: usize = 3;

struct SymbolTable {
    // Index is the symbol id; sid 0 has no text.
    symbols: Vec<Option<String>>,
}

impl SymbolTable {
    fn system() -> Self {
        let mut symbols = vec![None];
        symbols.extend(SYSTEM_SYMBOLS.iter().map(|s| Some((*s).to_owned())));
        Self { symbols }
    }

    fn text(&self, sid: usize) -> String {
        self.symbols
            .get(sid)
            .cloned()
            .flatten()
            .unwrap_or_else(|| format!("${sid}"))
    }

    /// Apply a `$ion_symbol_table::{...}` struct that has already been decoded.
    fn apply(&mut self, table: &Value) {
        let append = table.get("imports").and_then(Value::as_str) == Some("$ion_symbol_table");
        if !append {
            *self = Self::system();
        }
        if let Some(symbols) = table.get("symbols").and_then(Value::as_array) {
            self.symbols
                .extend(symbols.iter().map(|s| s.as_str().map(str::to_owned)));
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, LedgerError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| LedgerError::Decode(format!("unexpected end of input at {}", self.pos)))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], LedgerError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                LedgerError::Decode(format!("length {len} at {} overruns input", self.pos))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn var_uint(&mut self) -> Result<usize, LedgerError> {
        let mut value = 0usize;
        loop {
            let b = self.byte()?;
            value = value
                .checked_mul(128)
                .ok_or_else(|| LedgerError::Decode("VarUInt overflow".to_owned()))?
                | usize::from(b & 0x7F);
            if b & 0x80 != 0 {
                return Ok(value);
            }
        }
    }

    fn var_int(&mut self) -> Result<i64, LedgerError> {
        let (negative, magnitude) = self.var_int_parts()?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Sign and magnitude of a VarInt, keeping negative zero distinct.
    fn var_int_parts(&mut self) -> Result<(bool, i64), LedgerError> {
        let first = self.byte()?;
        let negative = first & 0x40 != 0;
        let mut value = i64::from(first & 0x3F);
        let mut done = first & 0x80 != 0;
        while !done {
            let b = self.byte()?;
            value = value
                .checked_mul(128)
                .ok_or_else(|| LedgerError::Decode("VarInt overflow".to_owned()))?
                | i64::from(b & 0x7F);
            done = b & 0x80 != 0;
        }
        Ok((negative, value))
    }

    fn length(&mut self, low_nibble: u8) -> Result<usize, LedgerError> {
        if low_nibble == 14 {
            self.var_uint()
        } else {
            Ok(usize::from(low_nibble))
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn sub_reader(&mut self, len: usize) -> Result<Reader<'a>, LedgerError> {
        Ok(Reader {
            data: self.take(len)?,
            pos: 0,
        })
    }

    /// Read one value. Returns `None` for NOP padding.
    fn value(&mut self, symbols: &SymbolTable) -> Result<Option<(Vec<usize>, Value)>, LedgerError> {
        let descriptor = self.byte()?;
        let (type_code, low) = (descriptor >> 4, descriptor & 0x0F);

        if type_code == 0xE {
            let len = self.length(low)?;
            let mut wrapper = self.sub_reader(len)?;
            let annotations_len = wrapper.var_uint()?;
            let mut annotation_reader = wrapper.sub_reader(annotations_len)?;
            let mut annotations = Vec::new();
            while !annotation_reader.at_end() {
                annotations.push(annotation_reader.var_uint()?);
            }
            return Ok(wrapper.value(symbols)?.map(|(_, v)| (annotations, v)));
        }

        if low == 0x0F && type_code != 0xF {
            return Ok(Some((Vec::new(), Value::Null)));
        }

        let value = match type_code {
            0x0 => {
                let len = self.length(low)?;
                self.take(len)?;
                return Ok(None);
            }
            0x1 => Value::Bool(low == 1),
            0x2 | 0x3 => {
                let len = self.length(low)?;
                let magnitude = uint(self.take(len)?)?;
                if type_code == 0x3 {
                    let signed = i64::try_from(magnitude).map_err(|_| {
                        LedgerError::Decode(format!("negative int -{magnitude} out of range"))
                    })?;
                    Value::from(-signed)
                } else {
                    Value::from(magnitude)
                }
            }
            0x4 => {
                let len = self.length(low)?;
                let bytes = self.take(len)?;
                let float = match len {
                    0 => 0.0,
                    4 => f64::from(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
                    8 => {
                        let mut buf = [0u8; 8];
                        buf.copy_from_slice(bytes);
                        f64::from_be_bytes(buf)
                    }
                    other => return Err(LedgerError::Decode(format!("float of length {other}"))),
                };
                Number::from_f64(float).map_or(Value::Null, Value::Number)
            }
            0x5 => {
                let len = self.length(low)?;
                let mut body = self.sub_reader(len)?;
                if len == 0 {
                    Value::String("0".to_owned())
                } else {
                    let exponent = body.var_int()?;
                    let rest = body.take(body.data.len() - body.pos)?;
                    Value::String(decimal_text(rest, exponent)?)
                }
            }
            0x6 => {
                let len = self.length(low)?;
                let mut body = self.sub_reader(len)?;
                Value::String(timestamp_text(&mut body)?)
            }
            0x7 => {
                let len = self.length(low)?;
                let sid = uint(self.take(len)?)?;
                Value::String(symbols.text(sid as usize))
            }
            0x8 => {
                let len = self.length(low)?;
                let text = std::str::from_utf8(self.take(len)?)
                    .map_err(|e| LedgerError::Decode(format!("invalid UTF-8 string: {e}")))?;
                Value::String(text.to_owned())
            }
            0x9 => {
                let len = self.length(low)?;
                Value::String(self.take(len)?.iter().copied().map(char::from).collect())
            }
            0xA => {
                let len = self.length(low)?;
                Value::String(STANDARD.encode(self.take(len)?))
            }
            0xB | 0xC => {
                let len = self.length(low)?;
                let mut body = self.sub_reader(len)?;
                let mut items = Vec::new();
                while !body.at_end() {
                    if let Some((_, item)) = body.value(symbols)? {
                        items.push(item);
                    }
                }
                Value::Array(items)
            }
            0xD => {
                let len = if low == 1 {
                    self.var_uint()?
                } else {
                    self.length(low)?
                };
                let mut body = self.sub_reader(len)?;
                let mut fields = Map::new();
                while !body.at_end() {
                    let sid = body.var_uint()?;
                    if let Some((_, field)) = body.value(symbols)? {
                        fields.insert(symbols.text(sid), field);
                    }
                }
                Value::Object(fields)
            }
            other => {
                return Err(LedgerError::Decode(format!(
                    "reserved type code {other:#x} at {}",
                    self.pos - 1
                )))
            }
        };
        Ok(Some((Vec::new(), value)))
    }
}

fn uint(bytes: &[u8]) -> Result<u64, LedgerError> {
    if bytes.len() > 8 {
        return Err(LedgerError::Decode(format!(
            "{}-byte integer does not fit in 64 bits",
            bytes.len()
        )));
    }
    Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// Render a decimal from its sign-magnitude coefficient bytes and exponent.
fn decimal_text(coefficient: &[u8], exponent: i64) -> Result<String, LedgerError> {
    let (negative, magnitude) = match coefficient.split_first() {
        None => (false, 0),
        Some((&first, rest)) => {
            let mut bytes = Vec::with_capacity(coefficient.len());
            bytes.push(first & 0x7F);
            bytes.extend_from_slice(rest);
            (first & 0x80 != 0, uint(&bytes)?)
        }
    };
    let digits = magnitude.to_string();
    let sign = if negative { "-" } else { "" };
    if exponent >= 0 {
        let zeros = "0".repeat(usize::try_from(exponent).unwrap_or(0));
        return Ok(format!("{sign}{digits}{zeros}"));
    }
    let scale = usize::try_from(-exponent).unwrap_or(0);
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    Ok(format!("{sign}{int_part}.{frac_part}"))
}

/// Render a binary timestamp body as Ion text, at the precision it carries.
///
/// The encoded fields are UTC; minute precision and finer are shifted into
/// the local offset, with an unknown offset written as `-00:00`.
fn timestamp_text(body: &mut Reader<'_>) -> Result<String, LedgerError> {
    let offset = match body.var_int_parts()? {
        (true, 0) => None,
        (negative, minutes) => Some(if negative { -minutes } else { minutes }),
    };
    let year = body.var_uint()?;
    if body.at_end() {
        return Ok(format!("{year:04}T"));
    }
    let month = body.var_uint()?;
    if body.at_end() {
        return Ok(format!("{year:04}-{month:02}T"));
    }
    let day = body.var_uint()?;
    if body.at_end() {
        return Ok(format!("{year:04}-{month:02}-{day:02}"));
    }
    let hour = body.var_uint()?;
    let minute = body.var_uint()?;
    let second = if body.at_end() {
        None
    } else {
        Some(body.var_uint()?)
    };
    let fraction = if body.at_end() {
        String::new()
    } else {
        let exponent = body.var_int()?;
        let coefficient = body.take(body.data.len() - body.pos)?;
        let text = decimal_text(coefficient, exponent)?;
        text.strip_prefix('0')
            .filter(|f| f.starts_with('.'))
            .unwrap_or_default()
            .to_owned()
    };

    let invalid = || LedgerError::Decode(format!("invalid timestamp {year}-{month}-{day}T{hour}:{minute}"));
    let utc = NaiveDate::from_ymd_opt(
        i32::try_from(year).map_err(|_| invalid())?,
        month as u32,
        day as u32,
    )
    .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second.unwrap_or(0) as u32))
    .ok_or_else(invalid)?;
    let local = TimeDelta::try_minutes(offset.unwrap_or(0))
        .and_then(|delta| utc.checked_add_signed(delta))
        .ok_or_else(invalid)?;

    let mut text = local.format("%Y-%m-%dT%H:%M").to_string();
    if second.is_some() {
        text.push_str(&local.format(":%S").to_string());
        text.push_str(&fraction);
    }
    match offset {
        None => text.push_str("-00:00"),
        Some(0) => text.push('Z'),
        Some(minutes) => {
            let sign = if minutes < 0 { '-' } else { '+' };
            let minutes = minutes.unsigned_abs();
            text.push_str(&format!("{sign}{:02}:{:02}", minutes / 60, minutes % 60));
        }
    }
    Ok(text)
}

/// Decode every top-level user value in an Ion binary stream.
pub fn decode_values(bytes: &[u8]) -> Result<Vec<Value>, LedgerError> {
    let mut reader = Reader { data: bytes, pos: 0 };
    let mut symbols = SymbolTable::system();
    let mut values = Vec::new();

    while !reader.at_end() {
        if reader.data[reader.pos..].starts_with(&IVM) {
            reader.pos += IVM.len();
            symbols = SymbolTable::system();
            continue;
        }
        let Some((annotations, value)) = reader.value(&symbols)? else {
            continue;
        };
        if annotations.first() == Some(&SID_ION_SYMBOL_TABLE) && value.is_object() {
            symbols.apply(&value);
        } else {
            values.push(value);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_document_id_table(value: &[u8]) -> Vec<u8> {
        let mut bytes = IVM.to_vec();
        // $ion_symbol_table::{symbols:["documentId"]}
        bytes.extend_from_slice(&[0xEE, 0x90, 0x81, 0x83, 0xDD, 0x87, 0xBB, 0x8A]);
        bytes.extend_from_slice(b"documentId");
        bytes.extend_from_slice(value);
        bytes
    }

    #[test]
    fn decodes_insert_result_with_local_symbols() {
        // {documentId: "abc"}
        let bytes = with_document_id_table(&[0xD5, 0x8A, 0x83, b'a', b'b', b'c']);
        let values = decode_values(&bytes).unwrap();
        assert_eq!(values, vec![json!({"documentId": "abc"})]);
    }

    #[test]
    fn decodes_scalars() {
        let mut bytes = IVM.to_vec();
        bytes.extend_from_slice(&[
            0x21, 0x07, // 7
            0x31, 0x02, // -2
            0x11, // true
            0x0F, // null
            0x71, 0x04, // symbol 'name'
            0x00, // NOP pad
        ]);
        let values = decode_values(&bytes).unwrap();
        assert_eq!(values, vec![json!(7), json!(-2), json!(true), Value::Null, json!("name")]);
    }

    #[test]
    fn decodes_nested_list_in_struct() {
        let mut bytes = IVM.to_vec();
        // {name: [1, "x"]}
        bytes.extend_from_slice(&[0xD6, 0x84, 0xB4, 0x21, 0x01, 0x81, b'x']);
        let values = decode_values(&bytes).unwrap();
        assert_eq!(values, vec![json!({"name": [1, "x"]})]);
    }

    #[test]
    fn decodes_decimal_as_text() {
        let mut bytes = IVM.to_vec();
        // 90.25 = coefficient 9025 (0x2341), exponent -2 (VarInt 0xC2)
        bytes.extend_from_slice(&[0x53, 0xC2, 0x23, 0x41]);
        assert_eq!(decode_values(&bytes).unwrap(), vec![json!("90.25")]);
        assert_eq!(decimal_text(&[0x85], -3).unwrap(), "-0.005");
        assert_eq!(decimal_text(&[0x02], 2).unwrap(), "200");
    }

    #[test]
    fn decodes_timestamps_at_their_precision() {
        let mut bytes = IVM.to_vec();
        bytes.extend_from_slice(&[
            // 2019-01-01, unknown offset
            0x65, 0xC0, 0x0F, 0xE3, 0x81, 0x81,
            // 2019T
            0x63, 0xC0, 0x0F, 0xE3,
            // 2019-01-01T10:20Z
            0x67, 0x80, 0x0F, 0xE3, 0x81, 0x81, 0x8A, 0x94,
            // 2019-01-01T23:30:05.250 UTC at +01:00
            0x6B, 0xBC, 0x0F, 0xE3, 0x81, 0x81, 0x97, 0x9E, 0x85, 0xC3, 0x00, 0xFA,
            // 2019-01-01T10:20:00 UTC, unknown offset
            0x68, 0xC0, 0x0F, 0xE3, 0x81, 0x81, 0x8A, 0x94, 0x80,
            // null.timestamp
            0x6F,
        ]);
        assert_eq!(
            decode_values(&bytes).unwrap(),
            vec![
                json!("2019-01-01"),
                json!("2019T"),
                json!("2019-01-01T10:20Z"),
                json!("2019-01-02T00:30:05.250+01:00"),
                json!("2019-01-01T10:20:00-00:00"),
                Value::Null,
            ]
        );
    }

    #[test]
    fn impossible_timestamp_is_an_error() {
        let mut bytes = IVM.to_vec();
        // month 13
        bytes.extend_from_slice(&[0x67, 0x80, 0x0F, 0xE3, 0x8D, 0x81, 0x80, 0x80]);
        assert!(matches!(decode_values(&bytes), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn decodes_blob_as_base64_and_clob_as_text() {
        let mut bytes = IVM.to_vec();
        bytes.extend_from_slice(&[0xA3, 0x01, 0x02, 0x03, 0x92, b'h', b'i', 0xA0]);
        assert_eq!(decode_values(&bytes).unwrap(), vec![json!("AQID"), json!("hi"), json!("")]);
    }

    #[test]
    fn unknown_symbol_ids_render_as_sid() {
        let mut bytes = IVM.to_vec();
        bytes.extend_from_slice(&[0x71, 0x2A]);
        assert_eq!(decode_values(&bytes).unwrap(), vec![json!("$42")]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut bytes = IVM.to_vec();
        bytes.extend_from_slice(&[0x83, b'a']);
        assert!(matches!(decode_values(&bytes), Err(LedgerError::Decode(_))));
    }
}
