//! JSON to protobuf encoding.
//!
//! Fields are written in proto3 wire format:
//! - Each field is encoded as (tag, value) pairs
//! - Tag = (field_number << 3) | wire_type
//! - Repeated scalars are packed, repeated strings/bytes/messages are not
//! - JSON `null` leaves a field unset

use super::{ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema, ProtoType};
use crate::error::{Result, WireError};
use base64::Engine;
use protobuf::CodedOutputStream;
use serde_json::Value;

fn encode_err(e: protobuf::Error) -> WireError {
    WireError::Encode(e.to_string())
}

/// Encodes JSON documents as protobuf messages described by a [`ProtoSchema`].
pub struct ProtoEncoder<'a> {
    schema: &'a ProtoSchema,
}

impl<'a> ProtoEncoder<'a> {
    pub fn new(schema: &'a ProtoSchema) -> Self {
        Self { schema }
    }

    /// Encode a JSON object as `message_type`.
    pub fn encode(&self, message_type: &str, json: &Value) -> Result<Vec<u8>> {
        let descriptor = self.schema.message(message_type)?;
        self.encode_message(descriptor, json)
    }

    fn encode_message(&self, descriptor: &ProtoMessageDescriptor, json: &Value) -> Result<Vec<u8>> {
        let object = json.as_object().ok_or_else(|| {
            WireError::Encode(format!(
                "expected a JSON object for message {}, got {}",
                descriptor.name,
                json_kind(json)
            ))
        })?;

        if let Some(unknown) = object.keys().find(|k| descriptor.field(k).is_none()) {
            return Err(WireError::Encode(format!(
                "unknown field '{unknown}' for message {}",
                descriptor.name
            )));
        }

        let mut buffer = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut buffer);

            for field in &descriptor.fields {
                match object.get(&field.name) {
                    None | Some(Value::Null) => {}
                    Some(value) if field.is_repeated => {
                        self.encode_repeated(&mut stream, field, value)?
                    }
                    Some(value) => self.encode_field(&mut stream, field, value)?,
                }
            }

            stream.flush().map_err(encode_err)?;
        }

        Ok(buffer)
    }

    fn encode_repeated(
        &self,
        stream: &mut CodedOutputStream,
        field: &ProtoFieldDescriptor,
        value: &Value,
    ) -> Result<()> {
        let items = value.as_array().ok_or_else(|| {
            WireError::Encode(format!(
                "field '{}' is repeated, expected a JSON array, got {}",
                field.name,
                json_kind(value)
            ))
        })?;

        if !field.field_type.is_packable() {
            for item in items {
                self.encode_field(stream, field, item)?;
            }
            return Ok(());
        }

        if items.is_empty() {
            return Ok(());
        }

        let mut packed = Vec::new();
        {
            let mut inner = CodedOutputStream::vec(&mut packed);
            for item in items {
                self.encode_scalar_no_tag(&mut inner, field, item)?;
            }
            inner.flush().map_err(encode_err)?;
        }
        stream
            .write_bytes(field.number as u32, &packed)
            .map_err(encode_err)
    }

    fn encode_field(
        &self,
        stream: &mut CodedOutputStream,
        field: &ProtoFieldDescriptor,
        value: &Value,
    ) -> Result<()> {
        let number = field.number as u32;
        match &field.field_type {
            ProtoType::String => stream
                .write_string(number, expect_str(field, value)?)
                .map_err(encode_err),
            ProtoType::Bytes => stream
                .write_bytes(number, &decode_base64(field, value)?)
                .map_err(encode_err),
            ProtoType::Message(type_name) => {
                let nested = self.schema.message(type_name)?;
                let body = self.encode_message(nested, value)?;
                stream.write_bytes(number, &body).map_err(encode_err)
            }
            ProtoType::Double => stream
                .write_double(number, expect_f64(field, value)?)
                .map_err(encode_err),
            ProtoType::Float => stream
                .write_float(number, expect_f64(field, value)? as f32)
                .map_err(encode_err),
            ProtoType::Int32 => stream
                .write_int32(number, expect_i32(field, value)?)
                .map_err(encode_err),
            ProtoType::Sint32 => stream
                .write_sint32(number, expect_i32(field, value)?)
                .map_err(encode_err),
            ProtoType::Sfixed32 => stream
                .write_sfixed32(number, expect_i32(field, value)?)
                .map_err(encode_err),
            ProtoType::Int64 => stream
                .write_int64(number, expect_i64(field, value)?)
                .map_err(encode_err),
            ProtoType::Sint64 => stream
                .write_sint64(number, expect_i64(field, value)?)
                .map_err(encode_err),
            ProtoType::Sfixed64 => stream
                .write_sfixed64(number, expect_i64(field, value)?)
                .map_err(encode_err),
            ProtoType::Uint32 => stream
                .write_uint32(number, expect_u32(field, value)?)
                .map_err(encode_err),
            ProtoType::Fixed32 => stream
                .write_fixed32(number, expect_u32(field, value)?)
                .map_err(encode_err),
            ProtoType::Uint64 => stream
                .write_uint64(number, expect_u64(field, value)?)
                .map_err(encode_err),
            ProtoType::Fixed64 => stream
                .write_fixed64(number, expect_u64(field, value)?)
                .map_err(encode_err),
            ProtoType::Bool => stream
                .write_bool(number, expect_bool(field, value)?)
                .map_err(encode_err),
            ProtoType::Enum(type_name) => stream
                .write_enum(number, self.enum_number(field, type_name, value)?)
                .map_err(encode_err),
        }
    }

    fn encode_scalar_no_tag(
        &self,
        stream: &mut CodedOutputStream,
        field: &ProtoFieldDescriptor,
        value: &Value,
    ) -> Result<()> {
        // Only reached for packable types.
        match &field.field_type {
            ProtoType::Double => stream.write_double_no_tag(expect_f64(field, value)?),
            ProtoType::Float => stream.write_float_no_tag(expect_f64(field, value)? as f32),
            ProtoType::Int32 => stream.write_int32_no_tag(expect_i32(field, value)?),
            ProtoType::Sint32 => stream.write_sint32_no_tag(expect_i32(field, value)?),
            ProtoType::Sfixed32 => stream.write_sfixed32_no_tag(expect_i32(field, value)?),
            ProtoType::Int64 => stream.write_int64_no_tag(expect_i64(field, value)?),
            ProtoType::Sint64 => stream.write_sint64_no_tag(expect_i64(field, value)?),
            ProtoType::Sfixed64 => stream.write_sfixed64_no_tag(expect_i64(field, value)?),
            ProtoType::Uint32 => stream.write_uint32_no_tag(expect_u32(field, value)?),
            ProtoType::Fixed32 => stream.write_fixed32_no_tag(expect_u32(field, value)?),
            ProtoType::Uint64 => stream.write_uint64_no_tag(expect_u64(field, value)?),
            ProtoType::Fixed64 => stream.write_fixed64_no_tag(expect_u64(field, value)?),
            ProtoType::Bool => stream.write_bool_no_tag(expect_bool(field, value)?),
            ProtoType::Enum(type_name) => {
                stream.write_enum_no_tag(self.enum_number(field, type_name, value)?)
            }
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_) => {
                return Err(WireError::Encode(format!(
                    "field '{}' of type {} cannot be packed",
                    field.name, field.field_type
                )))
            }
        }
        .map_err(encode_err)
    }

    fn enum_number(&self, field: &ProtoFieldDescriptor, type_name: &str, value: &Value) -> Result<i32> {
        if let Some(name) = value.as_str() {
            let descriptor = self.schema.find_enum(type_name).ok_or_else(|| {
                WireError::Encode(format!("enum type {type_name} not found in schema"))
            })?;
            return descriptor.value_of(name).ok_or_else(|| {
                WireError::Encode(format!(
                    "'{name}' is not a value of enum {} (field '{}')",
                    descriptor.name, field.name
                ))
            });
        }
        expect_i32(field, value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(field: &ProtoFieldDescriptor, value: &Value) -> WireError {
    WireError::Encode(format!(
        "field '{}' expects {}, got {}",
        field.name,
        field.field_type,
        json_kind(value)
    ))
}

fn expect_str<'v>(field: &ProtoFieldDescriptor, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| mismatch(field, value))
}

fn expect_bool(field: &ProtoFieldDescriptor, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| mismatch(field, value))
}

fn expect_f64(field: &ProtoFieldDescriptor, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| mismatch(field, value))
}

// 64-bit integers may arrive as JSON strings to survive lossy JSON tooling.
fn expect_i64(field: &ProtoFieldDescriptor, value: &Value) -> Result<i64> {
    match value {
        Value::String(s) => s.parse().map_err(|_| mismatch(field, value)),
        _ => value.as_i64().ok_or_else(|| mismatch(field, value)),
    }
}

fn expect_u64(field: &ProtoFieldDescriptor, value: &Value) -> Result<u64> {
    match value {
        Value::String(s) => s.parse().map_err(|_| mismatch(field, value)),
        _ => value.as_u64().ok_or_else(|| mismatch(field, value)),
    }
}

fn expect_i32(field: &ProtoFieldDescriptor, value: &Value) -> Result<i32> {
    let wide = expect_i64(field, value)?;
    i32::try_from(wide).map_err(|_| {
        WireError::Encode(format!("field '{}': {wide} is out of range", field.name))
    })
}

fn expect_u32(field: &ProtoFieldDescriptor, value: &Value) -> Result<u32> {
    let wide = expect_u64(field, value)?;
    u32::try_from(wide).map_err(|_| {
        WireError::Encode(format!("field '{}': {wide} is out of range", field.name))
    })
}

fn decode_base64(field: &ProtoFieldDescriptor, value: &Value) -> Result<Vec<u8>> {
    let text = expect_str(field, value)?;
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| WireError::Encode(format!("field '{}' is not valid base64: {e}", field.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::decoder::ProtoDecoder;
    use crate::proto::ProtoFieldValue;
    use serde_json::json;

    fn schema() -> ProtoSchema {
        ProtoSchema::from_string(
            r#"
            syntax = "proto3";

            message Order {
                enum Status {
                    PENDING = 0;
                    SHIPPED = 1;
                }
                message Line {
                    string sku = 1;
                    uint32 quantity = 2;
                }
                string id = 1;
                int64 total_cents = 2;
                repeated Line lines = 3;
                repeated sint32 adjustments = 4;
                Status status = 5;
                bytes signature = 6;
                double weight = 7;
            }
            "#,
        )
        .expect("Failed to parse proto")
    }

    #[test]
    fn test_encode_then_decode_nested_order() {
        let schema = schema();
        let doc = json!({
            "id": "o-1",
            "total_cents": "1999",
            "lines": [{"sku": "A", "quantity": 2}, {"sku": "B", "quantity": 1}],
            "adjustments": [-5, 3],
            "status": "SHIPPED",
            "signature": "AQID",
            "weight": 1.5
        });

        let bytes = ProtoEncoder::new(&schema).encode("Order", &doc).unwrap();
        let message = ProtoDecoder::new(&schema).decode("Order", &bytes).unwrap();

        assert_eq!(
            message.fields.get("total_cents"),
            Some(&ProtoFieldValue::Int64(1999))
        );
        assert_eq!(message.fields.get("status"), Some(&ProtoFieldValue::Enum(1)));
        assert_eq!(
            message.fields.get("signature"),
            Some(&ProtoFieldValue::Bytes(vec![1, 2, 3]))
        );
        assert_eq!(
            message.fields.get("adjustments"),
            Some(&ProtoFieldValue::Repeated(vec![
                ProtoFieldValue::Int32(-5),
                ProtoFieldValue::Int32(3)
            ]))
        );
        let Some(ProtoFieldValue::Repeated(lines)) = message.fields.get("lines") else {
            panic!("expected repeated lines");
        };
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_encode_rejects_unknown_field() {
        let schema = schema();
        let err = ProtoEncoder::new(&schema)
            .encode("Order", &json!({"id": "o-1", "color": "red"}))
            .unwrap_err();
        assert!(err.to_string().contains("color"));
    }

    #[test]
    fn test_encode_rejects_type_mismatch() {
        let schema = schema();
        let err = ProtoEncoder::new(&schema)
            .encode("Order", &json!({"id": 5}))
            .unwrap_err();
        assert!(matches!(err, WireError::Encode(_)));
    }

    #[test]
    fn test_encode_rejects_unknown_enum_name() {
        let schema = schema();
        let err = ProtoEncoder::new(&schema)
            .encode("Order", &json!({"status": "LOST"}))
            .unwrap_err();
        assert!(err.to_string().contains("LOST"));
    }

    #[test]
    fn test_encode_non_object() {
        let schema = schema();
        assert!(ProtoEncoder::new(&schema).encode("Order", &json!([1, 2])).is_err());
    }

    #[test]
    fn test_encode_null_leaves_field_unset() {
        let schema = schema();
        let bytes = ProtoEncoder::new(&schema)
            .encode("Order", &json!({"id": null}))
            .unwrap();
        assert!(bytes.is_empty());
    }
}
