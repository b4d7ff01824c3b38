use {
    serde::{Deserialize, Serialize},
    serde_json::{json, Value},
};

/// Decoding a binary action payload never recurses deeper than this. Nesting
/// beyond it means a pathological or corrupt ABI.
const MAX_DECODE_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AbiDecodeError {
    #[error("type {0:?} is not defined by the ABI")]
    UnknownType(String),
    #[error("type {0:?} is not decodable by this reader")]
    UnsupportedType(String),
    #[error("payload ended while reading a {0}")]
    UnexpectedEnd(&'static str),
    #[error("string field is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("optional flag must be 0 or 1, got {0}")]
    InvalidOptionalFlag(u8),
    #[error("type nesting exceeds {MAX_DECODE_DEPTH} levels")]
    DepthExceeded,
    #[error("{0} bytes left over after decoding the action payload")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub index_type: String,
}

///
/// A contract's interface description: the mapping from action and table
/// names to binary layouts, as published on chain by that contract.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Abi {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub structs: Vec<StructDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

impl Abi {
    /// The struct type an action of the given name serializes as, if the ABI
    /// declares one.
    pub fn action_type_for(&self, action_name: &str) -> Option<&str> {
        self.actions
            .iter()
            .find(|a| a.name == action_name)
            .map(|a| a.type_name.as_str())
    }

    fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        // Alias chains are short in practice; the bound guards cycles.
        for _ in 0..MAX_DECODE_DEPTH {
            match self.types.iter().find(|t| t.new_type_name == current) {
                Some(def) => current = &def.type_name,
                None => break,
            }
        }
        current
    }

    /// Decodes a binary action payload into a JSON value according to the
    /// given type name. The payload must be fully consumed.
    pub fn decode_action(&self, type_name: &str, data: &[u8]) -> Result<Value, AbiDecodeError> {
        let mut reader = ByteReader::new(data);
        let value = self.decode_type(type_name, &mut reader, 0)?;
        if !reader.is_empty() {
            return Err(AbiDecodeError::TrailingBytes(reader.remaining()));
        }
        Ok(value)
    }

    fn decode_type(
        &self,
        type_name: &str,
        reader: &mut ByteReader,
        depth: usize,
    ) -> Result<Value, AbiDecodeError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(AbiDecodeError::DepthExceeded);
        }

        if let Some(inner) = type_name.strip_suffix("[]") {
            let count = reader.read_varuint32()? as usize;
            let mut items = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                items.push(self.decode_type(inner, reader, depth + 1)?);
            }
            return Ok(Value::Array(items));
        }

        if let Some(inner) = type_name.strip_suffix('?') {
            return match reader.read_u8()? {
                0 => Ok(Value::Null),
                1 => self.decode_type(inner, reader, depth + 1),
                flag => Err(AbiDecodeError::InvalidOptionalFlag(flag)),
            };
        }

        // Binary extension: the field may simply be absent at the tail.
        if let Some(inner) = type_name.strip_suffix('$') {
            if reader.is_empty() {
                return Ok(Value::Null);
            }
            return self.decode_type(inner, reader, depth + 1);
        }

        let resolved = self.resolve_alias(type_name);
        if let Some(value) = decode_base_type(resolved, reader)? {
            return Ok(value);
        }

        let Some(struct_def) = self.struct_def(resolved) else {
            return Err(AbiDecodeError::UnknownType(type_name.to_owned()));
        };
        self.decode_struct(struct_def, reader, depth)
    }

    fn decode_struct(
        &self,
        struct_def: &StructDef,
        reader: &mut ByteReader,
        depth: usize,
    ) -> Result<Value, AbiDecodeError> {
        let mut object = serde_json::Map::new();

        if !struct_def.base.is_empty() {
            let base_name = self.resolve_alias(&struct_def.base);
            let Some(base_def) = self.struct_def(base_name) else {
                return Err(AbiDecodeError::UnknownType(struct_def.base.clone()));
            };
            let base_value = self.decode_struct(base_def, reader, depth + 1)?;
            if let Value::Object(fields) = base_value {
                object.extend(fields);
            }
        }

        for field in &struct_def.fields {
            let value = self.decode_type(&field.type_name, reader, depth + 1)?;
            object.insert(field.name.clone(), value);
        }
        Ok(Value::Object(object))
    }
}

fn decode_base_type(
    type_name: &str,
    reader: &mut ByteReader,
) -> Result<Option<Value>, AbiDecodeError> {
    let value = match type_name {
        "bool" => json!(reader.read_u8()? != 0),
        "int8" => json!(reader.read_u8()? as i8),
        "uint8" => json!(reader.read_u8()?),
        "int16" => json!(i16::from_le_bytes(reader.read_array::<2>("int16")?)),
        "uint16" => json!(u16::from_le_bytes(reader.read_array::<2>("uint16")?)),
        "int32" => json!(i32::from_le_bytes(reader.read_array::<4>("int32")?)),
        "uint32" => json!(u32::from_le_bytes(reader.read_array::<4>("uint32")?)),
        "int64" => json!(i64::from_le_bytes(reader.read_array::<8>("int64")?)),
        "uint64" => json!(u64::from_le_bytes(reader.read_array::<8>("uint64")?)),
        "int128" => json!(i128::from_le_bytes(reader.read_array::<16>("int128")?).to_string()),
        "uint128" => json!(u128::from_le_bytes(reader.read_array::<16>("uint128")?).to_string()),
        "varuint32" => json!(reader.read_varuint32()?),
        "varint32" => {
            let raw = reader.read_varuint32()?;
            // Zigzag decoding.
            json!((raw >> 1) as i32 ^ -((raw & 1) as i32))
        }
        "float32" => json!(f32::from_le_bytes(reader.read_array::<4>("float32")?)),
        "float64" => json!(f64::from_le_bytes(reader.read_array::<8>("float64")?)),
        "time_point" => json!(i64::from_le_bytes(reader.read_array::<8>("time_point")?)),
        "time_point_sec" => {
            json!(u32::from_le_bytes(reader.read_array::<4>("time_point_sec")?))
        }
        "block_timestamp_type" => {
            json!(u32::from_le_bytes(reader.read_array::<4>("block_timestamp_type")?))
        }
        "name" | "account_name" | "action_name" | "permission_name" | "table_name"
        | "scope_name" => {
            json!(name_to_string(u64::from_le_bytes(
                reader.read_array::<8>("name")?
            )))
        }
        "string" => {
            let len = reader.read_varuint32()? as usize;
            Value::String(String::from_utf8(reader.read_bytes(len, "string")?.to_vec())?)
        }
        "bytes" => {
            let len = reader.read_varuint32()? as usize;
            json!(hex::encode(reader.read_bytes(len, "bytes")?))
        }
        "checksum160" => json!(hex::encode(reader.read_bytes(20, "checksum160")?)),
        "checksum256" => json!(hex::encode(reader.read_bytes(32, "checksum256")?)),
        "checksum512" => json!(hex::encode(reader.read_bytes(64, "checksum512")?)),
        "symbol_code" => {
            json!(symbol_code_to_string(u64::from_le_bytes(
                reader.read_array::<8>("symbol_code")?
            )))
        }
        "symbol" => {
            let raw = u64::from_le_bytes(reader.read_array::<8>("symbol")?);
            json!(format!("{},{}", raw & 0xff, symbol_code_to_string(raw >> 8)))
        }
        "asset" => {
            let amount = i64::from_le_bytes(reader.read_array::<8>("asset")?);
            let raw_symbol = u64::from_le_bytes(reader.read_array::<8>("asset")?);
            json!(format_asset(amount, raw_symbol))
        }
        "public_key" | "signature" => {
            return Err(AbiDecodeError::UnsupportedType(type_name.to_owned()));
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Converts a packed 64-bit chain name to its dotted string form.
pub fn name_to_string(value: u64) -> String {
    const CHARSET: &[u8] = b".12345abcdefghijklmnopqrstuvwxyz";
    let mut chars = [b'.'; 13];
    let mut tmp = value;
    for i in 0..13 {
        let mask = if i == 0 { 0x0f } else { 0x1f };
        chars[12 - i] = CHARSET[(tmp & mask) as usize];
        tmp >>= if i == 0 { 4 } else { 5 };
    }
    let text = std::str::from_utf8(&chars).expect("charset is ascii");
    text.trim_end_matches('.').to_owned()
}

fn symbol_code_to_string(raw: u64) -> String {
    let mut code = String::new();
    let mut tmp = raw;
    while tmp > 0 {
        code.push((tmp & 0xff) as u8 as char);
        tmp >>= 8;
    }
    code
}

fn format_asset(amount: i64, raw_symbol: u64) -> String {
    let precision = (raw_symbol & 0xff) as usize;
    let code = symbol_code_to_string(raw_symbol >> 8);
    let sign = if amount < 0 { "-" } else { "" };
    let magnitude = amount.unsigned_abs();
    if precision == 0 {
        return format!("{sign}{magnitude} {code}");
    }
    let scale = 10u64.pow(precision as u32);
    format!(
        "{sign}{}.{:0width$} {code}",
        magnitude / scale,
        magnitude % scale,
        width = precision
    )
}

struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn read_u8(&mut self) -> Result<u8, AbiDecodeError> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or(AbiDecodeError::UnexpectedEnd("byte"))?;
        self.position += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], AbiDecodeError> {
        if self.remaining() < len {
            return Err(AbiDecodeError::UnexpectedEnd(what));
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], AbiDecodeError> {
        let slice = self.read_bytes(N, what)?;
        Ok(slice.try_into().expect("length checked"))
    }

    fn read_varuint32(&mut self) -> Result<u32, AbiDecodeError> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 35 {
                return Err(AbiDecodeError::UnexpectedEnd("varuint32"));
            }
        }
        Ok(result as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn string_to_name(text: &str) -> u64 {
        const CHARSET: &[u8] = b".12345abcdefghijklmnopqrstuvwxyz";
        let symbol = |c: u8| CHARSET.iter().position(|&x| x == c).unwrap() as u64;
        let bytes = text.as_bytes();
        let mut value = 0u64;
        for i in 0..12 {
            if i < bytes.len() {
                value |= (symbol(bytes[i]) & 0x1f) << (64 - 5 * (i + 1));
            }
        }
        if bytes.len() > 12 {
            value |= symbol(bytes[12]) & 0x0f;
        }
        value
    }

    fn transfer_abi() -> Abi {
        serde_json::from_value(serde_json::json!({
            "version": "eosio::abi/1.1",
            "types": [{"new_type_name": "account", "type": "name"}],
            "structs": [{
                "name": "transfer",
                "base": "",
                "fields": [
                    {"name": "from", "type": "account"},
                    {"name": "to", "type": "account"},
                    {"name": "quantity", "type": "asset"},
                    {"name": "memo", "type": "string"},
                ],
            }],
            "actions": [{"name": "transfer", "type": "transfer"}],
            "tables": [],
        }))
        .unwrap()
    }

    fn encode_transfer(from: &str, to: &str, amount: i64, memo: &str) -> Vec<u8> {
        let mut data = vec![];
        data.extend_from_slice(&string_to_name(from).to_le_bytes());
        data.extend_from_slice(&string_to_name(to).to_le_bytes());
        data.extend_from_slice(&amount.to_le_bytes());
        // "4,EOS" packed symbol
        let symbol: u64 = 4 | (u64::from_le_bytes(*b"EOS\0\0\0\0\0") << 8);
        data.extend_from_slice(&symbol.to_le_bytes());
        data.push(memo.len() as u8);
        data.extend_from_slice(memo.as_bytes());
        data
    }

    #[test]
    fn name_round_trip() {
        for name in ["eosio", "eosio.token", "battlefield1", "a", "zzzzzzzzzzzzj"] {
            assert_eq!(name_to_string(string_to_name(name)), name);
        }
    }

    #[test]
    fn it_should_decode_a_transfer_payload() {
        let abi = transfer_abi();
        assert_eq!(abi.action_type_for("transfer"), Some("transfer"));

        let data = encode_transfer("alice", "bob", 15000, "rent");
        let decoded = abi.decode_action("transfer", &data).unwrap();
        assert_eq!(
            decoded,
            serde_json::json!({
                "from": "alice",
                "to": "bob",
                "quantity": "1.5000 EOS",
                "memo": "rent",
            })
        );
    }

    #[test]
    fn it_should_reject_trailing_bytes() {
        let abi = transfer_abi();
        let mut data = encode_transfer("alice", "bob", 1, "");
        data.push(0xff);
        let err = abi.decode_action("transfer", &data).unwrap_err();
        assert!(matches!(err, AbiDecodeError::TrailingBytes(1)));
    }

    #[test]
    fn it_should_reject_truncated_payloads() {
        let abi = transfer_abi();
        let data = encode_transfer("alice", "bob", 1, "");
        let err = abi.decode_action("transfer", &data[..10]).unwrap_err();
        assert!(matches!(err, AbiDecodeError::UnexpectedEnd(_)));
    }

    #[test]
    fn unknown_types_are_reported() {
        let abi = Abi::default();
        let err = abi.decode_action("mystery", &[]).unwrap_err();
        assert!(matches!(err, AbiDecodeError::UnknownType(t) if t == "mystery"));
    }

    #[test]
    fn arrays_optionals_and_extensions() {
        let abi: Abi = serde_json::from_value(serde_json::json!({
            "version": "eosio::abi/1.1",
            "structs": [{
                "name": "sample",
                "base": "",
                "fields": [
                    {"name": "values", "type": "uint8[]"},
                    {"name": "label", "type": "string?"},
                    {"name": "extra", "type": "uint32$"},
                ],
            }],
            "actions": [{"name": "sample", "type": "sample"}],
        }))
        .unwrap();

        // Two array entries, no label, extension absent.
        let decoded = abi.decode_action("sample", &[2, 7, 9, 0]).unwrap();
        assert_eq!(
            decoded,
            serde_json::json!({"values": [7, 9], "label": null, "extra": null})
        );

        // Label present, extension present.
        let mut data = vec![1, 7, 1, 2, b'h', b'i'];
        data.extend_from_slice(&42u32.to_le_bytes());
        let decoded = abi.decode_action("sample", &data).unwrap();
        assert_eq!(
            decoded,
            serde_json::json!({"values": [7], "label": "hi", "extra": 42})
        );
    }

    #[test]
    fn negative_assets_format_with_sign() {
        assert_eq!(
            format_asset(-5, 2 | (u64::from_le_bytes(*b"SYS\0\0\0\0\0") << 8)),
            "-0.05 SYS"
        );
    }

    #[test]
    fn struct_base_fields_come_first() {
        let abi: Abi = serde_json::from_value(serde_json::json!({
            "structs": [
                {"name": "parent", "base": "", "fields": [{"name": "a", "type": "uint8"}]},
                {"name": "child", "base": "parent", "fields": [{"name": "b", "type": "uint8"}]},
            ],
        }))
        .unwrap();
        let decoded = abi.decode_action("child", &[1, 2]).unwrap();
        assert_eq!(decoded, serde_json::json!({"a": 1, "b": 2}));
    }
}
