//! Protobuf payload codec with message-index framing.
//!
//! A protobuf payload inside the schema envelope starts with the path of the
//! message type within the schema file:
//!
//! `[count(zigzag varint)][index(zigzag varint)]*[message bytes]`
//!
//! The path `[0]` (first top-level message) is written as the single byte
//! `0x00`. A leading count of zero is read back as `[0]`.

use super::decoder::ProtoDecoder;
use super::encoder::ProtoEncoder;
use super::json::message_to_json;
use super::ProtoSchema;
use crate::error::{Result, WireError};
use protobuf::{CodedInputStream, CodedOutputStream};
use serde_json::Value;
use std::path::Path;
use topic_cli_schema_registry::ResolvedSchema;

/// Encodes JSON to, and decodes JSON from, one protobuf schema.
#[derive(Debug, Clone)]
pub struct ProtobufCodec {
    schema: ProtoSchema,
}

impl ProtobufCodec {
    pub fn new(schema: ProtoSchema) -> Result<Self> {
        if schema.root_messages.is_empty() {
            return Err(WireError::ProtobufParse(
                "schema declares no top-level message".to_string(),
            ));
        }
        Ok(Self { schema })
    }

    /// Parse a schema file whose imports resolve against `include_dirs`.
    pub fn from_file(path: &Path, include_dirs: &[&Path]) -> Result<Self> {
        Self::new(ProtoSchema::from_file_with_includes(path, include_dirs)?)
    }

    /// Parse a schema resolved through the registry; imports resolve against
    /// the directory its references were stored in.
    pub fn from_resolved(resolved: &ResolvedSchema) -> Result<Self> {
        Self::from_file(&resolved.schema_path, &[resolved.reference_dir.as_path()])
    }

    /// Encode a JSON document as the first top-level message.
    pub fn serialize(&self, json: &Value) -> Result<Vec<u8>> {
        let message_type = self.resolve_path(&[0])?;
        let body = ProtoEncoder::new(&self.schema).encode(&message_type, json)?;

        let mut payload = encode_message_indexes(&[0])?;
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    /// Decode a payload (envelope already stripped) to JSON.
    pub fn deserialize(&self, payload: &[u8]) -> Result<Value> {
        let (indexes, consumed) = decode_message_indexes(payload)?;
        let message_type = self.resolve_path(&indexes)?;
        let message = ProtoDecoder::new(&self.schema).decode(&message_type, &payload[consumed..])?;
        Ok(message_to_json(&self.schema, &message))
    }

    /// Walk a message-index path to the qualified name of the message type.
    fn resolve_path(&self, indexes: &[i32]) -> Result<String> {
        let out_of_range = |index: i32| {
            WireError::Decode(format!("message index {index} does not exist in schema"))
        };

        let (first, rest) = indexes
            .split_first()
            .ok_or_else(|| WireError::Decode("empty message index path".to_string()))?;
        let mut name = usize::try_from(*first)
            .ok()
            .and_then(|i| self.schema.root_messages.get(i))
            .ok_or_else(|| out_of_range(*first))?
            .clone();

        for index in rest {
            let descriptor = self.schema.message(&name)?;
            name = usize::try_from(*index)
                .ok()
                .and_then(|i| descriptor.nested_types.get(i))
                .ok_or_else(|| out_of_range(*index))?
                .clone();
        }

        Ok(name)
    }
}

/// Encode a message-index path as zigzag varints.
pub fn encode_message_indexes(indexes: &[i32]) -> Result<Vec<u8>> {
    if indexes == [0] {
        return Ok(vec![0]);
    }
    let encode_err = |e: protobuf::Error| WireError::Encode(e.to_string());

    let mut out = Vec::new();
    {
        let mut stream = CodedOutputStream::vec(&mut out);
        stream
            .write_sint64_no_tag(indexes.len() as i64)
            .map_err(encode_err)?;
        for index in indexes {
            stream.write_sint32_no_tag(*index).map_err(encode_err)?;
        }
        stream.flush().map_err(encode_err)?;
    }
    Ok(out)
}

/// Decode a message-index path, returning it with the number of bytes read.
pub fn decode_message_indexes(data: &[u8]) -> Result<(Vec<i32>, usize)> {
    let truncated = |e: protobuf::Error| WireError::Decode(format!("invalid message index: {e}"));

    let mut input = CodedInputStream::from_bytes(data);
    let count = input.read_sint64().map_err(truncated)?;
    let indexes = if count == 0 {
        vec![0]
    } else {
        if count < 0 || count as usize > data.len() {
            return Err(WireError::Decode(format!(
                "invalid message index count {count}"
            )));
        }
        (0..count)
            .map(|_| input.read_sint32().map_err(truncated))
            .collect::<Result<Vec<_>>>()?
    };

    let consumed = usize::try_from(input.pos())
        .map_err(|_| WireError::Decode("message index too long".to_string()))?;
    Ok((indexes, consumed))
}
