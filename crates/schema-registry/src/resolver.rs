//! Schema resolution for one command invocation.
//!
//! The resolver owns a temporary directory holding every schema it had to
//! materialize (references and schemas fetched by ID). The directory lives as
//! long as the resolver and is removed when it is dropped, whatever the exit
//! path.

use crate::error::Result;
use crate::source::SchemaSource;
use crate::subject::{topic_subject, SubjectRole};
use crate::types::{SchemaReference, SchemaType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// What the user asked for on the command line for one half of a record.
#[derive(Debug, Clone)]
pub struct SchemaRequest<'a> {
    pub topic: &'a str,
    pub role: SubjectRole,
    pub schema_type: SchemaType,
    /// Local schema file to register
    pub schema_path: Option<&'a Path>,
    /// Local references file (JSON array of `{name, subject, version}`)
    pub references_path: Option<&'a Path>,
    /// Existing schema ID to use instead of registering
    pub schema_id: Option<u32>,
    /// Registry context qualifying the subject
    pub context: Option<&'a str>,
}

/// A schema ready to build a serializer from.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub schema_id: u32,
    pub schema_type: SchemaType,
    /// Schema file on disk (the user's file, or a fetched copy)
    pub schema_path: PathBuf,
    /// Directory that `import`-style references resolve against
    pub reference_dir: PathBuf,
    /// Reference name -> file in `reference_dir`
    pub reference_paths: HashMap<String, PathBuf>,
}

impl ResolvedSchema {
    pub fn read_schema(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.schema_path)
    }

    /// Reference schema texts, ordered by reference name.
    pub fn read_references(&self) -> std::io::Result<Vec<String>> {
        let mut names: Vec<&String> = self.reference_paths.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| std::fs::read_to_string(&self.reference_paths[name]))
            .collect()
    }
}

pub struct SchemaResolver {
    source: Arc<dyn SchemaSource>,
    dir: TempDir,
}

impl SchemaResolver {
    pub fn new(source: Arc<dyn SchemaSource>) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("topic-cli-schemas").tempdir()?;
        Ok(Self { source, dir })
    }

    pub fn reference_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Register (or fetch) the schema for one half of a record.
    ///
    /// Returns `None` when neither a schema file nor a schema ID was given:
    /// the plain-string path needs no registry at all.
    pub async fn resolve(&self, request: &SchemaRequest<'_>) -> Result<Option<ResolvedSchema>> {
        if let Some(schema_id) = request.schema_id {
            return self.fetch(schema_id).await.map(Some);
        }

        let schema_path = match request.schema_path {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Ok(None),
        };

        let references = match request.references_path {
            Some(path) => SchemaReference::load_file(path)?,
            None => Vec::new(),
        };
        let reference_paths = self
            .source
            .store_references(self.dir.path(), &references)
            .await?;

        let schema = tokio::fs::read_to_string(schema_path).await?;
        let subject = topic_subject(request.topic, request.role, request.context);
        let schema_id = self
            .source
            .register(&subject, request.schema_type, &schema, &references)
            .await?;
        info!("Using schema ID {schema_id} for subject {subject}");

        Ok(Some(ResolvedSchema {
            schema_id,
            schema_type: request.schema_type,
            schema_path: schema_path.to_path_buf(),
            reference_dir: self.dir.path().to_path_buf(),
            reference_paths,
        }))
    }

    /// Materialize an already-registered schema into the reference directory.
    pub async fn fetch(&self, schema_id: u32) -> Result<ResolvedSchema> {
        let definition = self.source.schema_by_id(schema_id).await?;
        let reference_paths = self
            .source
            .store_references(self.dir.path(), &definition.references)
            .await?;

        let schema_path = self.dir.path().join(format!(
            "schema-{schema_id}.{}",
            definition.schema_type.file_extension()
        ));
        tokio::fs::write(&schema_path, definition.schema.as_bytes()).await?;

        Ok(ResolvedSchema {
            schema_id,
            schema_type: definition.schema_type,
            schema_path,
            reference_dir: self.dir.path().to_path_buf(),
            reference_paths,
        })
    }
}
