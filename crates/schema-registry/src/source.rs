use crate::error::{RegistryError, Result};
use crate::types::{SchemaDefinition, SchemaReference, SchemaType};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Operations the data plane needs from a schema registry.
///
/// Implemented by [`crate::SchemaRegistryClient`] over HTTP; tests plug in
/// in-memory registries.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Register `schema` under `subject`, returning its global ID.
    ///
    /// Registering an identical schema again returns the existing ID.
    async fn register(
        &self,
        subject: &str,
        schema_type: SchemaType,
        schema: &str,
        references: &[SchemaReference],
    ) -> Result<u32>;

    /// Fetch a schema by its global ID.
    async fn schema_by_id(&self, id: u32) -> Result<SchemaDefinition>;

    /// Fetch a specific version of a subject.
    async fn schema_by_version(&self, subject: &str, version: i32) -> Result<SchemaDefinition>;

    /// Write every referenced schema, transitively, into `dir`.
    ///
    /// Each file is named after the reference's `name` so that `import`
    /// statements resolve against `dir`. Names must be relative paths that
    /// stay inside `dir`. Returns `name -> path`.
    async fn store_references(
        &self,
        dir: &Path,
        references: &[SchemaReference],
    ) -> Result<HashMap<String, PathBuf>> {
        let mut paths = HashMap::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<SchemaReference> = references.to_vec();

        while let Some(reference) = pending.pop() {
            if !seen.insert(reference.name.clone()) {
                continue;
            }

            let path = dir.join(reference_file(&reference.name)?);
            let definition = self
                .schema_by_version(&reference.subject, reference.version)
                .await?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, definition.schema.as_bytes()).await?;
            debug!(
                "Stored reference {} ({} v{}) at {:?}",
                reference.name, reference.subject, reference.version, path
            );

            pending.extend(definition.references);
            paths.insert(reference.name, path);
        }

        Ok(paths)
    }
}

/// A reference name as a relative path below the reference directory.
fn reference_file(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let mut has_file = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_file = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid_reference_name(name));
            }
        }
    }
    if !has_file {
        return Err(invalid_reference_name(name));
    }
    Ok(path)
}

fn invalid_reference_name(name: &str) -> RegistryError {
    RegistryError::InvalidReferences {
        path: name.to_string(),
        message: "reference name must be a relative path without '..'".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_file_accepts_nested_relative_names() {
        assert_eq!(
            reference_file("google/type/money.proto").unwrap(),
            Path::new("google/type/money.proto")
        );
        assert!(reference_file("./common.avsc").is_ok());
    }

    #[test]
    fn test_reference_file_rejects_escaping_names() {
        for name in ["/tmp/escaped.avsc", "../escaped.avsc", "common/../../x.proto", "", "."] {
            assert!(
                matches!(
                    reference_file(name),
                    Err(RegistryError::InvalidReferences { .. })
                ),
                "{name:?} should be rejected"
            );
        }
    }
}
