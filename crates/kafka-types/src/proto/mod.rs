//! Runtime protobuf support.
//!
//! Schemas are parsed from `.proto` text at runtime, so records can be encoded
//! from and decoded to JSON without generated code.
//!
//! - [`parser`] - `.proto` files to [`ProtoSchema`]
//! - [`encoder`] - JSON to protobuf binary
//! - [`decoder`] - protobuf binary to [`ProtoMessage`]
//! - [`json`] - [`ProtoMessage`] to JSON
//! - [`codec`] - message-index framing and the [`ProtobufCodec`] used by the wire codec

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod json;
pub mod parser;

pub use codec::ProtobufCodec;

use std::collections::HashMap;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoFieldValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Enum number; names are applied when rendering
    Enum(i32),
    Message(Box<ProtoMessage>),
    Repeated(Vec<ProtoFieldValue>),
}

/// A decoded message: the fields present on the wire, by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoMessage {
    pub message_type: String,
    pub fields: HashMap<String, ProtoFieldValue>,
}

/// Declared type of a field. Message and enum types carry the referenced
/// type name as written by the parser (usually `.pkg.Outer.Inner`).
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message(String),
    Enum(String),
}

impl std::fmt::Display for ProtoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scalar = match self {
            ProtoType::Message(name) => return write!(f, "message:{name}"),
            ProtoType::Enum(name) => return write!(f, "enum:{name}"),
            ProtoType::Double => "double",
            ProtoType::Float => "float",
            ProtoType::Int32 => "int32",
            ProtoType::Int64 => "int64",
            ProtoType::Uint32 => "uint32",
            ProtoType::Uint64 => "uint64",
            ProtoType::Sint32 => "sint32",
            ProtoType::Sint64 => "sint64",
            ProtoType::Fixed32 => "fixed32",
            ProtoType::Fixed64 => "fixed64",
            ProtoType::Sfixed32 => "sfixed32",
            ProtoType::Sfixed64 => "sfixed64",
            ProtoType::Bool => "bool",
            ProtoType::String => "string",
            ProtoType::Bytes => "bytes",
        };
        f.write_str(scalar)
    }
}

impl ProtoType {
    /// Whether repeated fields of this type may use packed encoding.
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProtoFieldDescriptor {
    pub name: String,
    pub number: i32,
    pub field_type: ProtoType,
    pub is_repeated: bool,
}

#[derive(Debug, Clone)]
pub struct ProtoMessageDescriptor {
    /// Package-qualified name, e.g. `shop.Order.Line`
    pub name: String,
    /// In declaration order
    pub fields: Vec<ProtoFieldDescriptor>,
    /// Fully qualified names of nested message types, in declaration order
    pub nested_types: Vec<String>,
}

impl ProtoMessageDescriptor {
    pub fn field(&self, name: &str) -> Option<&ProtoFieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_number(&self, number: i32) -> Option<&ProtoFieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }
}

#[derive(Debug, Clone)]
pub struct ProtoEnumDescriptor {
    pub name: String,
    pub values: Vec<(String, i32)>,
}

impl ProtoEnumDescriptor {
    pub fn value_of(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == number)
            .map(|(n, _)| n.as_str())
    }
}

/// Every message and enum reachable from one `.proto` file and its imports.
///
/// Types are keyed by fully qualified name with a leading dot
/// (`.pkg.Outer.Inner`), the form field type references use.
#[derive(Debug, Clone, Default)]
pub struct ProtoSchema {
    pub messages: HashMap<String, ProtoMessageDescriptor>,
    pub enums: HashMap<String, ProtoEnumDescriptor>,
    /// Top-level messages of the root file, in declaration order
    pub root_messages: Vec<String>,
}

impl ProtoSchema {
    /// Look up a message by qualified name, with or without the leading dot,
    /// or by a name suffix that matches exactly one message.
    pub fn find_message(&self, name: &str) -> Option<&ProtoMessageDescriptor> {
        lookup(&self.messages, name)
    }

    pub fn find_enum(&self, name: &str) -> Option<&ProtoEnumDescriptor> {
        lookup(&self.enums, name)
    }
}

/// `.pkg.Outer.Inner` for a type declared in `scope`.
pub(crate) fn qualify(scope: &str, name: &str) -> String {
    format!("{scope}.{name}")
}

fn lookup<'a, T>(types: &'a HashMap<String, T>, name: &str) -> Option<&'a T> {
    if let Some(found) = types.get(name) {
        return Some(found);
    }
    let dotted = format!(".{}", name.trim_start_matches('.'));
    if let Some(found) = types.get(&dotted) {
        return Some(found);
    }

    let mut matches = types
        .iter()
        .filter(|(key, _)| key.ends_with(&dotted))
        .map(|(_, found)| found);
    match (matches.next(), matches.next()) {
        (Some(found), None) => Some(found),
        _ => None,
    }
}
