//! `.proto` text to [`ProtoSchema`], using the pure-Rust `protobuf-parse`
//! frontend so no `protoc` binary is needed.

use super::{
    qualify, ProtoEnumDescriptor, ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema,
    ProtoType,
};
use crate::error::{Result, WireError};
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto};
use std::path::Path;

fn field_type(field: &FieldDescriptorProto) -> Result<ProtoType> {
    let Some(declared) = field.type_ else {
        return Err(WireError::ProtobufParse(format!(
            "field '{}' has no type",
            field.name()
        )));
    };
    let referenced = || field.type_name().to_string();

    Ok(match declared.enum_value_or_default() {
        Type::TYPE_DOUBLE => ProtoType::Double,
        Type::TYPE_FLOAT => ProtoType::Float,
        Type::TYPE_INT32 => ProtoType::Int32,
        Type::TYPE_INT64 => ProtoType::Int64,
        Type::TYPE_UINT32 => ProtoType::Uint32,
        Type::TYPE_UINT64 => ProtoType::Uint64,
        Type::TYPE_SINT32 => ProtoType::Sint32,
        Type::TYPE_SINT64 => ProtoType::Sint64,
        Type::TYPE_FIXED32 => ProtoType::Fixed32,
        Type::TYPE_FIXED64 => ProtoType::Fixed64,
        Type::TYPE_SFIXED32 => ProtoType::Sfixed32,
        Type::TYPE_SFIXED64 => ProtoType::Sfixed64,
        Type::TYPE_BOOL => ProtoType::Bool,
        Type::TYPE_STRING => ProtoType::String,
        Type::TYPE_BYTES => ProtoType::Bytes,
        Type::TYPE_MESSAGE => ProtoType::Message(referenced()),
        Type::TYPE_ENUM => ProtoType::Enum(referenced()),
        Type::TYPE_GROUP => {
            return Err(WireError::ProtobufParse(format!(
                "field '{}' is a proto2 group, which is not supported",
                field.name()
            )))
        }
    })
}

impl ProtoSchema {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with_includes(path, &[])
    }

    /// Parse `path`, resolving `import`s against its own directory and then
    /// `includes`.
    ///
    /// Types from imported files are registered so fields can refer to them,
    /// but only the root file's top-level messages become
    /// [`ProtoSchema::root_messages`].
    pub fn from_file_with_includes<P: AsRef<Path>>(path: P, includes: &[&Path]) -> Result<Self> {
        let root = std::fs::canonicalize(path.as_ref())?;

        let mut parser = protobuf_parse::Parser::new();
        parser.pure().input(&root);
        if let Some(dir) = root.parent() {
            parser.include(dir);
        }
        for dir in includes {
            parser.include(dir);
        }

        let parsed = parser
            .parse_and_typecheck()
            .map_err(|e| WireError::ProtobufParse(format!("{e:#}")))?;

        let root_file = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut schema = ProtoSchema::default();
        for file in &parsed.file_descriptors {
            let scope = match file.package() {
                "" => String::new(),
                package => format!(".{package}"),
            };
            for enum_type in &file.enum_type {
                schema.register_enum(&scope, enum_type);
            }

            let top_level = file
                .message_type
                .iter()
                .map(|message| schema.register_message(&scope, message))
                .collect::<Result<Vec<_>>>()?;
            if file.name() == root_file {
                schema.root_messages = top_level;
            }
        }

        Ok(schema)
    }

    /// Parse `.proto` source held in memory.
    #[cfg(test)]
    pub(crate) fn from_string(content: &str) -> Result<Self> {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".proto").tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Self::from_file(file.path())
    }

    /// The descriptor for `name`, or [`WireError::MessageTypeNotFound`].
    pub fn message(&self, name: &str) -> Result<&ProtoMessageDescriptor> {
        self.find_message(name)
            .ok_or_else(|| WireError::MessageTypeNotFound(name.to_string()))
    }

    fn register_message(&mut self, scope: &str, message: &DescriptorProto) -> Result<String> {
        let qualified = qualify(scope, message.name());

        let fields = message
            .field
            .iter()
            .filter(|field| !field.name().is_empty())
            .map(|field| {
                Ok(ProtoFieldDescriptor {
                    name: field.name().to_string(),
                    number: field.number(),
                    field_type: field_type(field)?,
                    is_repeated: field.label() == Label::LABEL_REPEATED,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for enum_type in &message.enum_type {
            self.register_enum(&qualified, enum_type);
        }
        let nested_types = message
            .nested_type
            .iter()
            .map(|nested| self.register_message(&qualified, nested))
            .collect::<Result<Vec<_>>>()?;

        self.messages.insert(
            qualified.clone(),
            ProtoMessageDescriptor {
                name: qualified.trim_start_matches('.').to_string(),
                fields,
                nested_types,
            },
        );
        Ok(qualified)
    }

    fn register_enum(&mut self, scope: &str, enum_type: &EnumDescriptorProto) {
        let qualified = qualify(scope, enum_type.name());
        let values = enum_type
            .value
            .iter()
            .map(|v| (v.name().to_string(), v.number()))
            .collect();
        self.enums.insert(
            qualified.clone(),
            ProtoEnumDescriptor {
                name: qualified.trim_start_matches('.').to_string(),
                values,
            },
        );
    }
}
