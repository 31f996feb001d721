//! Rendering decoded protobuf messages as JSON.

use super::{ProtoFieldValue, ProtoMessage, ProtoSchema, ProtoType};
use base64::Engine;
use serde_json::{Map, Number, Value};

/// Render `message` as a JSON object, fields in declaration order.
///
/// Proto3 omits scalar fields holding their default value from the wire, so
/// missing fields are filled with their proto3 default (`0`, `false`, `""`,
/// `[]`, the first enum value). Missing message fields render as `null`.
pub fn message_to_json(schema: &ProtoSchema, message: &ProtoMessage) -> Value {
    let mut object = Map::new();

    let Some(descriptor) = schema.find_message(&message.message_type) else {
        // Without a descriptor there is no declaration order or enum naming.
        for (name, value) in &message.fields {
            object.insert(name.clone(), field_to_json(schema, None, value));
        }
        return Value::Object(object);
    };

    for field in &descriptor.fields {
        let value = match message.fields.get(&field.name) {
            Some(value) => field_to_json(schema, Some(&field.field_type), value),
            None if field.is_repeated => Value::Array(Vec::new()),
            None => default_json(schema, &field.field_type),
        };
        object.insert(field.name.clone(), value);
    }

    Value::Object(object)
}

fn field_to_json(schema: &ProtoSchema, field_type: Option<&ProtoType>, value: &ProtoFieldValue) -> Value {
    match value {
        ProtoFieldValue::Double(v) => float_json(*v),
        ProtoFieldValue::Float(v) => float_json(f64::from(*v)),
        ProtoFieldValue::Int32(v) => Value::from(*v),
        ProtoFieldValue::Int64(v) => Value::from(*v),
        ProtoFieldValue::Uint32(v) => Value::from(*v),
        ProtoFieldValue::Uint64(v) => Value::from(*v),
        ProtoFieldValue::Bool(v) => Value::Bool(*v),
        ProtoFieldValue::String(v) => Value::String(v.clone()),
        ProtoFieldValue::Bytes(v) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(v))
        }
        ProtoFieldValue::Enum(number) => enum_json(schema, field_type, *number),
        ProtoFieldValue::Message(message) => message_to_json(schema, message),
        ProtoFieldValue::Repeated(values) => Value::Array(
            values
                .iter()
                .map(|v| field_to_json(schema, field_type, v))
                .collect(),
        ),
    }
}

fn enum_json(schema: &ProtoSchema, field_type: Option<&ProtoType>, number: i32) -> Value {
    let name = match field_type {
        Some(ProtoType::Enum(type_name)) => schema
            .find_enum(type_name)
            .and_then(|e| e.name_of(number)),
        _ => None,
    };
    match name {
        Some(name) => Value::String(name.to_string()),
        // Values added to the enum after this schema was written.
        None => Value::from(number),
    }
}

fn float_json(v: f64) -> Value {
    Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

fn default_json(schema: &ProtoSchema, field_type: &ProtoType) -> Value {
    match field_type {
        ProtoType::Double | ProtoType::Float => float_json(0.0),
        ProtoType::Int32
        | ProtoType::Int64
        | ProtoType::Uint32
        | ProtoType::Uint64
        | ProtoType::Sint32
        | ProtoType::Sint64
        | ProtoType::Fixed32
        | ProtoType::Fixed64
        | ProtoType::Sfixed32
        | ProtoType::Sfixed64 => Value::from(0),
        ProtoType::Bool => Value::Bool(false),
        ProtoType::String | ProtoType::Bytes => Value::String(String::new()),
        ProtoType::Enum(type_name) => schema
            .find_enum(type_name)
            .and_then(|e| e.name_of(0))
            .map(|name| Value::String(name.to_string()))
            .unwrap_or_else(|| Value::from(0)),
        ProtoType::Message(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn schema() -> ProtoSchema {
        ProtoSchema::from_string(
            r#"
            syntax = "proto3";

            enum Level {
                LOW = 0;
                HIGH = 1;
            }

            message Address {
                string city = 1;
            }

            message Alert {
                string name = 1;
                Level level = 2;
                bool active = 3;
                repeated string tags = 4;
                Address address = 5;
                bytes payload = 6;
            }
            "#,
        )
        .expect("Failed to parse proto")
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let schema = schema();
        let message = ProtoMessage {
            message_type: "Alert".to_string(),
            fields: HashMap::from([(
                "name".to_string(),
                ProtoFieldValue::String("disk".to_string()),
            )]),
        };

        let json = message_to_json(&schema, &message);
        assert_eq!(
            json,
            serde_json::json!({
                "name": "disk",
                "level": "LOW",
                "active": false,
                "tags": [],
                "address": null,
                "payload": ""
            })
        );
    }

    #[test]
    fn test_enum_names_nested_and_bytes() {
        let schema = schema();
        let address = ProtoMessage {
            message_type: "Address".to_string(),
            fields: HashMap::from([(
                "city".to_string(),
                ProtoFieldValue::String("Oslo".to_string()),
            )]),
        };
        let message = ProtoMessage {
            message_type: "Alert".to_string(),
            fields: HashMap::from([
                ("level".to_string(), ProtoFieldValue::Enum(1)),
                (
                    "address".to_string(),
                    ProtoFieldValue::Message(Box::new(address)),
                ),
                ("payload".to_string(), ProtoFieldValue::Bytes(vec![1, 2, 3])),
            ]),
        };

        let json = message_to_json(&schema, &message);
        assert_eq!(json["level"], "HIGH");
        assert_eq!(json["address"]["city"], "Oslo");
        assert_eq!(json["payload"], "AQID");
    }

    #[test]
    fn test_unknown_enum_number_renders_as_number() {
        let schema = schema();
        let message = ProtoMessage {
            message_type: "Alert".to_string(),
            fields: HashMap::from([("level".to_string(), ProtoFieldValue::Enum(7))]),
        };
        assert_eq!(message_to_json(&schema, &message)["level"], 7);
    }

    #[test]
    fn test_field_order_is_declaration_order() {
        let schema = schema();
        let message = ProtoMessage {
            message_type: "Alert".to_string(),
            fields: HashMap::new(),
        };
        let rendered = message_to_json(&schema, &message).to_string();
        let name_pos = rendered.find("\"name\"").unwrap();
        let payload_pos = rendered.find("\"payload\"").unwrap();
        assert!(name_pos < payload_pos);
    }
}
