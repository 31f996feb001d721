use crate::error::{RegistryError, Result};
use crate::source::SchemaSource;
use crate::subject::context_prefix;
use crate::types::{
    ErrorResponse, RegisterSchemaRequest, RegisterSchemaResponse, SchemaDefinition,
    SchemaReference, SchemaType,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Connection settings for a Confluent-compatible schema registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Base URL, e.g. `http://localhost:8081`
    pub endpoint: String,
    /// Basic-auth user (registry API key)
    pub api_key: Option<String>,
    /// Basic-auth password (registry API secret)
    pub api_secret: Option<String>,
    /// Registry context used to scope ID lookups
    pub context: Option<String>,
    pub timeout: Option<Duration>,
}

/// HTTP client for the schema registry.
pub struct SchemaRegistryClient {
    http: reqwest::Client,
    config: RegistryConfig,
}

impl SchemaRegistryClient {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(RegistryError::MissingEndpoint);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(Duration::from_secs(30)))
            .build()?;

        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.endpoint.trim_end_matches('/'))
    }

    /// `/subjects/{subject}{rest}`, with the subject percent-encoded.
    fn subject_url(&self, subject: &str, rest: &str) -> String {
        self.url(&format!("/subjects/{}{rest}", urlencoding::encode(subject)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.basic_auth(key, self.config.api_secret.as_ref()),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self
            .authorize(request)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &body))
    }
}

/// Map a failed registry response to an error, separating auth failures.
pub(crate) fn status_error(status: u16, body: &str) -> RegistryError {
    let parsed: Option<ErrorResponse> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    if status == 401 || status == 403 {
        return RegistryError::NotAuthenticated(message);
    }

    RegistryError::Status {
        status,
        error_code: parsed.map(|e| e.error_code).unwrap_or(0),
        message,
    }
}

#[async_trait]
impl SchemaSource for SchemaRegistryClient {
    async fn register(
        &self,
        subject: &str,
        schema_type: SchemaType,
        schema: &str,
        references: &[SchemaReference],
    ) -> Result<u32> {
        let url = self.subject_url(subject, "/versions");
        let body = RegisterSchemaRequest {
            schema,
            schema_type,
            references: references.to_vec(),
        };
        debug!("Registering {schema_type} schema under subject {subject}");

        let request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&body);
        let response: RegisterSchemaResponse = self.send(request).await?;

        debug!("Subject {subject} resolved to schema ID {}", response.id);
        Ok(response.id)
    }

    async fn schema_by_id(&self, id: u32) -> Result<SchemaDefinition> {
        let mut request = self.http.get(self.url(&format!("/schemas/ids/{id}")));
        if let Some(context) = self.config.context.as_deref().filter(|c| !c.is_empty()) {
            request = request.query(&[("subject", context_prefix(context))]);
        }
        self.send(request).await
    }

    async fn schema_by_version(&self, subject: &str, version: i32) -> Result<SchemaDefinition> {
        let url = self.subject_url(subject, &format!("/versions/{version}"));
        self.send(self.http.get(url)).await
    }
}
