//! Avro payload codec.
//!
//! Records are plain Avro binary datums (no container file header). JSON is
//! mapped onto the schema strictly: unknown record fields, missing fields
//! without a default and out-of-range numbers are all rejected before anything
//! is sent.

use crate::error::{Result, WireError};
use apache_avro::schema::{Name, RecordSchema};
use apache_avro::types::Value;
use apache_avro::Schema;
use base64::Engine;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use topic_cli_schema_registry::ResolvedSchema;

pub struct AvroCodec {
    schema: Schema,
    /// The main schema followed by every referenced schema
    schemata: Vec<Schema>,
    /// Named types by full name, for resolving `Schema::Ref`
    names: HashMap<String, Schema>,
}

impl std::fmt::Debug for AvroCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvroCodec")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl AvroCodec {
    /// Parse `schema`, resolving named types against `references`.
    pub fn new(schema: &str, references: &[String]) -> Result<Self> {
        let mut inputs: Vec<&str> = references.iter().map(String::as_str).collect();
        inputs.push(schema);

        let mut parsed = Schema::parse_list(&inputs)
            .map_err(|e| WireError::Encode(format!("invalid Avro schema: {e}")))?;
        let main = parsed
            .pop()
            .ok_or_else(|| WireError::Encode("empty Avro schema list".to_string()))?;

        let mut schemata = vec![main.clone()];
        schemata.extend(parsed);

        let mut names = HashMap::new();
        for s in &schemata {
            collect_names(s, &mut names);
        }

        Ok(Self {
            schema: main,
            schemata,
            names,
        })
    }

    pub fn from_resolved(resolved: &ResolvedSchema) -> Result<Self> {
        let schema = resolved.read_schema()?;
        let references = resolved.read_references()?;
        Self::new(&schema, &references)
    }

    pub fn serialize(&self, json: &JsonValue) -> Result<Vec<u8>> {
        let value = self.json_to_avro(json, &self.schema)?;
        apache_avro::to_avro_datum_schemata(&self.schema, self.schemata.iter().collect(), value)
            .map_err(|e| WireError::Encode(format!("avro encode: {e}")))
    }

    pub fn deserialize(&self, payload: &[u8]) -> Result<JsonValue> {
        let mut reader = payload;
        let value = apache_avro::from_avro_datum_schemata(
            &self.schema,
            self.schemata.iter().collect(),
            &mut reader,
            None,
        )
        .map_err(|e| WireError::Decode(format!("avro decode: {e}")))?;
        Ok(avro_to_json(&value))
    }

    fn json_to_avro(&self, json: &JsonValue, schema: &Schema) -> Result<Value> {
        let mismatch = || {
            WireError::Encode(format!(
                "cannot encode {json} as Avro {}",
                schema_label(schema)
            ))
        };

        match (schema, json) {
            (Schema::Ref { name }, _) => {
                let target = self.lookup(name)?;
                self.json_to_avro(json, target)
            }
            (Schema::Union(union), _) => self.json_to_union(json, union.variants()),
            (Schema::Null, JsonValue::Null) => Ok(Value::Null),
            (Schema::Boolean, JsonValue::Bool(b)) => Ok(Value::Boolean(*b)),
            (Schema::Int, JsonValue::Number(n)) => n
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::Int)
                .ok_or_else(mismatch),
            (Schema::Long, JsonValue::Number(n)) => n.as_i64().map(Value::Long).ok_or_else(mismatch),
            (Schema::Float, JsonValue::Number(n)) => n
                .as_f64()
                .map(|f| Value::Float(f as f32))
                .ok_or_else(mismatch),
            (Schema::Double, JsonValue::Number(n)) => {
                n.as_f64().map(Value::Double).ok_or_else(mismatch)
            }
            (Schema::String, JsonValue::String(s)) => Ok(Value::String(s.clone())),
            (Schema::Bytes, JsonValue::String(s)) => Ok(Value::Bytes(decode_base64(s)?)),
            (Schema::Fixed(fixed), JsonValue::String(s)) => {
                let bytes = decode_base64(s)?;
                if bytes.len() != fixed.size {
                    return Err(WireError::Encode(format!(
                        "fixed {} needs {} bytes, got {}",
                        fixed.name.name,
                        fixed.size,
                        bytes.len()
                    )));
                }
                Ok(Value::Fixed(fixed.size, bytes))
            }
            (Schema::Enum(e), JsonValue::String(symbol)) => e
                .symbols
                .iter()
                .position(|s| s == symbol)
                .map(|i| Value::Enum(i as u32, symbol.clone()))
                .ok_or_else(|| {
                    WireError::Encode(format!(
                        "'{symbol}' is not a symbol of enum {}",
                        e.name.name
                    ))
                }),
            (Schema::Date, JsonValue::Number(n)) => n
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::Date)
                .ok_or_else(mismatch),
            (Schema::TimeMillis, JsonValue::Number(n)) => n
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::TimeMillis)
                .ok_or_else(mismatch),
            (Schema::TimeMicros, JsonValue::Number(n)) => {
                n.as_i64().map(Value::TimeMicros).ok_or_else(mismatch)
            }
            (Schema::TimestampMillis, JsonValue::Number(n)) => {
                n.as_i64().map(Value::TimestampMillis).ok_or_else(mismatch)
            }
            (Schema::TimestampMicros, JsonValue::Number(n)) => {
                n.as_i64().map(Value::TimestampMicros).ok_or_else(mismatch)
            }
            (Schema::TimestampNanos, JsonValue::Number(n)) => {
                n.as_i64().map(Value::TimestampNanos).ok_or_else(mismatch)
            }
            (Schema::LocalTimestampMillis, JsonValue::Number(n)) => {
                n.as_i64().map(Value::LocalTimestampMillis).ok_or_else(mismatch)
            }
            (Schema::LocalTimestampMicros, JsonValue::Number(n)) => {
                n.as_i64().map(Value::LocalTimestampMicros).ok_or_else(mismatch)
            }
            (Schema::LocalTimestampNanos, JsonValue::Number(n)) => {
                n.as_i64().map(Value::LocalTimestampNanos).ok_or_else(mismatch)
            }
            (Schema::Uuid, JsonValue::String(s)) => resolve_as(Value::String(s.clone()), schema),
            // Decimal and duration take the base64 of their raw bytes, as rendered
            (Schema::Decimal(_), JsonValue::String(s)) => {
                resolve_as(Value::Bytes(decode_base64(s)?), schema)
            }
            (Schema::Duration, JsonValue::String(s)) => {
                let bytes = decode_base64(s)?;
                resolve_as(Value::Fixed(bytes.len(), bytes), schema)
            }
            (Schema::BigDecimal, JsonValue::String(s)) => s
                .parse::<apache_avro::BigDecimal>()
                .map(Value::BigDecimal)
                .map_err(|e| WireError::Encode(format!("invalid big-decimal '{s}': {e}"))),
            (Schema::BigDecimal, JsonValue::Number(n)) => n
                .to_string()
                .parse::<apache_avro::BigDecimal>()
                .map(Value::BigDecimal)
                .map_err(|_| mismatch()),
            (Schema::Array(array), JsonValue::Array(items)) => items
                .iter()
                .map(|item| self.json_to_avro(item, &array.items))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (Schema::Map(map), JsonValue::Object(entries)) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.json_to_avro(v, &map.types)?)))
                .collect::<Result<HashMap<_, _>>>()
                .map(Value::Map),
            (Schema::Record(record), JsonValue::Object(_)) => self.json_to_record(json, record),
            _ => Err(mismatch()),
        }
    }

    fn json_to_record(&self, json: &JsonValue, record: &RecordSchema) -> Result<Value> {
        let Some(object) = json.as_object() else {
            return Err(WireError::Encode(format!(
                "record {} needs a JSON object",
                record.name.name
            )));
        };

        if let Some(unknown) = object
            .keys()
            .find(|k| !record.fields.iter().any(|f| &f.name == *k))
        {
            return Err(WireError::Encode(format!(
                "unknown field '{unknown}' for record {}",
                record.name.name
            )));
        }

        let mut fields = Vec::with_capacity(record.fields.len());
        for field in &record.fields {
            let value = match (object.get(&field.name), &field.default) {
                (Some(v), _) => self.json_to_avro(v, &field.schema),
                (None, Some(default)) => self.default_to_avro(default, &field.schema),
                (None, None) if is_nullable(&field.schema) => {
                    self.json_to_avro(&JsonValue::Null, &field.schema)
                }
                (None, None) => Err(WireError::Encode(format!(
                    "missing required field '{}' of record {}",
                    field.name, record.name.name
                ))),
            }
            .map_err(|e| match e {
                WireError::Encode(msg) if !msg.starts_with("field '") => {
                    WireError::Encode(format!("field '{}': {msg}", field.name))
                }
                other => other,
            })?;
            fields.push((field.name.clone(), value));
        }
        Ok(Value::Record(fields))
    }

    // Defaults of union fields always match the first branch.
    fn default_to_avro(&self, default: &JsonValue, schema: &Schema) -> Result<Value> {
        match schema {
            Schema::Union(union) => {
                let first = union
                    .variants()
                    .first()
                    .ok_or_else(|| WireError::Encode("empty union".to_string()))?;
                Ok(Value::Union(0, Box::new(self.json_to_avro(default, first)?)))
            }
            _ => self.json_to_avro(default, schema),
        }
    }

    /// A union accepts the Avro JSON encoding `{"<branch>": value}` or a bare
    /// value matching one of its branches (first match wins).
    fn json_to_union(&self, json: &JsonValue, variants: &[Schema]) -> Result<Value> {
        if let JsonValue::Object(wrapper) = json {
            if wrapper.len() == 1 {
                if let Some((branch, inner)) = wrapper.iter().next() {
                    if let Some(idx) = variants.iter().position(|v| branch_matches(v, branch)) {
                        let value = self.json_to_avro(inner, &variants[idx])?;
                        return Ok(Value::Union(idx as u32, Box::new(value)));
                    }
                }
            }
        }

        for (idx, variant) in variants.iter().enumerate() {
            if let Ok(value) = self.json_to_avro(json, variant) {
                return Ok(Value::Union(idx as u32, Box::new(value)));
            }
        }

        let branches: Vec<String> = variants.iter().map(schema_label).collect();
        Err(WireError::Encode(format!(
            "{json} matches none of the union branches [{}]",
            branches.join(", ")
        )))
    }

    fn lookup(&self, name: &Name) -> Result<&Schema> {
        let full = name.fullname(None);
        self.names
            .get(&full)
            .or_else(|| self.names.values().find(|s| schema_simple_name(s) == Some(&name.name)))
            .ok_or_else(|| WireError::Encode(format!("unknown Avro type {full}")))
    }
}

fn collect_names(schema: &Schema, names: &mut HashMap<String, Schema>) {
    match schema {
        Schema::Record(record) => {
            names.insert(record.name.fullname(None), schema.clone());
            for field in &record.fields {
                collect_names(&field.schema, names);
            }
        }
        Schema::Enum(e) => {
            names.insert(e.name.fullname(None), schema.clone());
        }
        Schema::Fixed(f) => {
            names.insert(f.name.fullname(None), schema.clone());
        }
        Schema::Array(array) => collect_names(&array.items, names),
        Schema::Map(map) => collect_names(&map.types, names),
        Schema::Union(union) => {
            for variant in union.variants() {
                collect_names(variant, names);
            }
        }
        _ => {}
    }
}

fn schema_simple_name(schema: &Schema) -> Option<&String> {
    match schema {
        Schema::Record(r) => Some(&r.name.name),
        Schema::Enum(e) => Some(&e.name.name),
        Schema::Fixed(f) => Some(&f.name.name),
        _ => None,
    }
}

fn is_nullable(schema: &Schema) -> bool {
    match schema {
        Schema::Null => true,
        Schema::Union(union) => union.variants().iter().any(|v| matches!(v, Schema::Null)),
        _ => false,
    }
}

fn branch_matches(schema: &Schema, branch: &str) -> bool {
    match schema {
        Schema::Record(r) => r.name.name == branch || r.name.fullname(None) == branch,
        Schema::Enum(e) => e.name.name == branch || e.name.fullname(None) == branch,
        Schema::Fixed(f) => f.name.name == branch || f.name.fullname(None) == branch,
        Schema::Ref { name } => name.name == branch || name.fullname(None) == branch,
        other => schema_label(other) == branch,
    }
}

fn schema_label(schema: &Schema) -> String {
    match schema {
        Schema::Null => "null".to_string(),
        Schema::Boolean => "boolean".to_string(),
        Schema::Int => "int".to_string(),
        Schema::Long => "long".to_string(),
        Schema::Float => "float".to_string(),
        Schema::Double => "double".to_string(),
        Schema::Bytes => "bytes".to_string(),
        Schema::String => "string".to_string(),
        Schema::Array(_) => "array".to_string(),
        Schema::Map(_) => "map".to_string(),
        Schema::Union(_) => "union".to_string(),
        Schema::Record(r) => r.name.fullname(None),
        Schema::Enum(e) => e.name.fullname(None),
        Schema::Fixed(f) => f.name.fullname(None),
        Schema::Ref { name } => name.fullname(None),
        other => format!("{other:?}"),
    }
}

/// Let `apache_avro` convert `value` into the logical type `schema` names.
fn resolve_as(value: Value, schema: &Schema) -> Result<Value> {
    value
        .resolve(schema)
        .map_err(|e| WireError::Encode(format!("cannot encode as Avro {}: {e}", schema_label(schema))))
}

fn decode_base64(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| WireError::Encode(format!("invalid base64 bytes: {e}")))
}

fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Render a decoded Avro value as JSON. Union branches are unwrapped.
pub fn avro_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Long(l) => serde_json::json!(l),
        Value::Float(f) => serde_json::json!(f),
        Value::Double(d) => serde_json::json!(d),
        Value::Bytes(b) | Value::Fixed(_, b) => JsonValue::String(base64_encode(b)),
        Value::String(s) | Value::Enum(_, s) => JsonValue::String(s.clone()),
        Value::Union(_, inner) => avro_to_json(inner),
        Value::Array(items) => JsonValue::Array(items.iter().map(avro_to_json).collect()),
        Value::Map(entries) => {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            JsonValue::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), avro_to_json(&entries[k])))
                    .collect(),
            )
        }
        Value::Record(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        Value::Date(d) => serde_json::json!(d),
        Value::TimeMillis(t) => serde_json::json!(t),
        Value::TimeMicros(t) => serde_json::json!(t),
        Value::TimestampMillis(t) => serde_json::json!(t),
        Value::TimestampMicros(t) => serde_json::json!(t),
        Value::TimestampNanos(t) => serde_json::json!(t),
        Value::LocalTimestampMillis(t) => serde_json::json!(t),
        Value::LocalTimestampMicros(t) => serde_json::json!(t),
        Value::LocalTimestampNanos(t) => serde_json::json!(t),
        Value::Decimal(d) => {
            let bytes: Vec<u8> = d.try_into().unwrap_or_default();
            JsonValue::String(base64_encode(&bytes))
        }
        Value::BigDecimal(d) => JsonValue::String(d.to_string()),
        Value::Uuid(u) => JsonValue::String(u.to_string()),
        Value::Duration(d) => JsonValue::String(base64_encode(&<[u8; 12]>::from(*d))),
    }
}
