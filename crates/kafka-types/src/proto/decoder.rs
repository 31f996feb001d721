//! Protobuf binary to [`ProtoMessage`], guided by a parsed [`ProtoSchema`].

use super::{
    ProtoFieldDescriptor, ProtoFieldValue, ProtoMessage, ProtoMessageDescriptor, ProtoSchema,
    ProtoType,
};
use crate::error::{Result, WireError};
use protobuf::CodedInputStream;
use std::collections::HashMap;

const LENGTH_DELIMITED: u32 = 2;

fn wire(e: protobuf::Error) -> WireError {
    WireError::Decode(e.to_string())
}

pub struct ProtoDecoder<'a> {
    schema: &'a ProtoSchema,
}

impl<'a> ProtoDecoder<'a> {
    pub fn new(schema: &'a ProtoSchema) -> Self {
        Self { schema }
    }

    /// Decode `bytes` as `message_type`.
    ///
    /// A field number the schema does not declare is an error: it means the
    /// record was written with a different schema than the one its envelope
    /// names.
    pub fn decode(&self, message_type: &str, bytes: &[u8]) -> Result<ProtoMessage> {
        let descriptor = self.schema.message(message_type)?;
        self.read_message(descriptor, &mut CodedInputStream::from_bytes(bytes))
    }

    fn read_message(
        &self,
        descriptor: &ProtoMessageDescriptor,
        input: &mut CodedInputStream,
    ) -> Result<ProtoMessage> {
        let mut present: HashMap<String, ProtoFieldValue> = HashMap::new();

        while !input.eof().map_err(wire)? {
            let key = input.read_raw_varint32().map_err(wire)?;
            if key == 0 {
                break;
            }
            let (number, wire_type) = ((key >> 3) as i32, key & 0x7);

            let Some(field) = descriptor.field_by_number(number) else {
                return Err(WireError::Decode(format!(
                    "field number {number} is not declared in message {}",
                    descriptor.name
                )));
            };

            if !field.is_repeated {
                // Last occurrence wins for singular fields.
                present.insert(field.name.clone(), self.read_value(field, input)?);
                continue;
            }

            let packed = wire_type == LENGTH_DELIMITED && field.field_type.is_packable();
            let mut items = Vec::new();
            if packed {
                let length = input.read_raw_varint64().map_err(wire)?;
                let outer = input.push_limit(length).map_err(wire)?;
                while !input.eof().map_err(wire)? {
                    items.push(self.read_value(field, input)?);
                }
                input.pop_limit(outer);
            } else {
                items.push(self.read_value(field, input)?);
            }

            match present
                .entry(field.name.clone())
                .or_insert_with(|| ProtoFieldValue::Repeated(Vec::new()))
            {
                ProtoFieldValue::Repeated(list) => list.extend(items),
                other => *other = ProtoFieldValue::Repeated(items),
            }
        }

        Ok(ProtoMessage {
            message_type: descriptor.name.clone(),
            fields: present,
        })
    }

    fn read_value(
        &self,
        field: &ProtoFieldDescriptor,
        input: &mut CodedInputStream,
    ) -> Result<ProtoFieldValue> {
        use ProtoFieldValue as V;

        Ok(match &field.field_type {
            ProtoType::Double => V::Double(input.read_double().map_err(wire)?),
            ProtoType::Float => V::Float(input.read_float().map_err(wire)?),
            ProtoType::Int32 => V::Int32(input.read_int32().map_err(wire)?),
            ProtoType::Sint32 => V::Int32(input.read_sint32().map_err(wire)?),
            ProtoType::Sfixed32 => V::Int32(input.read_sfixed32().map_err(wire)?),
            ProtoType::Int64 => V::Int64(input.read_int64().map_err(wire)?),
            ProtoType::Sint64 => V::Int64(input.read_sint64().map_err(wire)?),
            ProtoType::Sfixed64 => V::Int64(input.read_sfixed64().map_err(wire)?),
            ProtoType::Uint32 => V::Uint32(input.read_uint32().map_err(wire)?),
            ProtoType::Fixed32 => V::Uint32(input.read_fixed32().map_err(wire)?),
            ProtoType::Uint64 => V::Uint64(input.read_uint64().map_err(wire)?),
            ProtoType::Fixed64 => V::Uint64(input.read_fixed64().map_err(wire)?),
            ProtoType::Bool => V::Bool(input.read_bool().map_err(wire)?),
            ProtoType::String => V::String(input.read_string().map_err(wire)?),
            ProtoType::Bytes => V::Bytes(input.read_bytes().map_err(wire)?),
            ProtoType::Enum(_) => V::Enum(input.read_int32().map_err(wire)?),
            ProtoType::Message(type_name) => {
                let nested = self.schema.message(type_name)?;
                let length = input.read_raw_varint64().map_err(wire)?;
                let outer = input.push_limit(length).map_err(wire)?;
                let message = self.read_message(nested, input)?;
                input.pop_limit(outer);
                V::Message(Box::new(message))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobuf::CodedOutputStream;

    fn schema() -> ProtoSchema {
        ProtoSchema::from_string(
            r#"
            syntax = "proto3";

            message Event {
                enum Kind {
                    CREATED = 0;
                    DELETED = 1;
                }
                message Source {
                    string host = 1;
                }
                string id = 1;
                sint32 delta = 2;
                repeated int32 counts = 3;
                Kind kind = 4;
                Source source = 5;
                fixed64 checksum = 6;
            }
            "#,
        )
        .expect("Failed to parse proto")
    }

    #[test]
    fn test_decode_scalars_enum_and_nested() {
        let mut source = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut source);
            os.write_string(1, "web-1").unwrap();
            os.flush().unwrap();
        }

        let mut data = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut data);
            os.write_string(1, "evt-1").unwrap();
            os.write_sint32(2, -7).unwrap();
            os.write_int32(4, 1).unwrap();
            os.write_bytes(5, &source).unwrap();
            os.write_fixed64(6, 42).unwrap();
            os.flush().unwrap();
        }

        let schema = schema();
        let message = ProtoDecoder::new(&schema).decode("Event", &data).unwrap();

        assert_eq!(
            message.fields.get("id"),
            Some(&ProtoFieldValue::String("evt-1".to_string()))
        );
        assert_eq!(message.fields.get("delta"), Some(&ProtoFieldValue::Int32(-7)));
        assert_eq!(message.fields.get("kind"), Some(&ProtoFieldValue::Enum(1)));
        assert_eq!(
            message.fields.get("checksum"),
            Some(&ProtoFieldValue::Uint64(42))
        );

        let Some(ProtoFieldValue::Message(nested)) = message.fields.get("source") else {
            panic!("expected nested source message");
        };
        assert_eq!(
            nested.fields.get("host"),
            Some(&ProtoFieldValue::String("web-1".to_string()))
        );
    }

    #[test]
    fn test_decode_packed_and_unpacked_repeated() {
        let mut packed_body = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut packed_body);
            os.write_int32_no_tag(1).unwrap();
            os.write_int32_no_tag(2).unwrap();
            os.flush().unwrap();
        }

        let mut data = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut data);
            os.write_bytes(3, &packed_body).unwrap();
            os.write_int32(3, 3).unwrap();
            os.flush().unwrap();
        }

        let schema = schema();
        let message = ProtoDecoder::new(&schema).decode("Event", &data).unwrap();
        assert_eq!(
            message.fields.get("counts"),
            Some(&ProtoFieldValue::Repeated(vec![
                ProtoFieldValue::Int32(1),
                ProtoFieldValue::Int32(2),
                ProtoFieldValue::Int32(3),
            ]))
        );
    }

    #[test]
    fn test_decode_unknown_field_number() {
        let mut data = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut data);
            os.write_int32(99, 1).unwrap();
            os.flush().unwrap();
        }

        let schema = schema();
        let err = ProtoDecoder::new(&schema).decode("Event", &data).unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }

    #[test]
    fn test_decode_unknown_message_type() {
        let schema = schema();
        let err = ProtoDecoder::new(&schema).decode("Missing", &[]).unwrap_err();
        assert!(matches!(err, WireError::MessageTypeNotFound(_)));
    }
}
