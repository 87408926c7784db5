//! HTTP list backend and the schema-less row it serves.
//!
//! # Design
//! - Rows are kept as JSON objects; only the identifier is typed, so one
//!   backend serves every resource profile.
//! - Status codes are classified once here: 400/422 reject the input, 404/409
//!   on a mutation mean the target moved on, everything else is a transport
//!   failure.
//! - A fired cancellation token drops the in-flight request future, which
//!   aborts the underlying connection.

use async_trait::async_trait;
use pagewise_core::{ListBackend, ListItem, PageRequest, SourceError};
use pagewise_telemetry::CommandScope;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::client::{ApiKeyCredential, HEADER_API_KEY, HEADER_REQUEST_ID, HEADER_RESOURCE};

/// Generic resource row: a string identifier plus every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Record {
    #[serde(deserialize_with = "id_from_scalar")]
    pub(crate) id: String,
    #[serde(flatten)]
    pub(crate) fields: Map<String, Value>,
}

impl Record {
    /// Display text of `field`; `id` resolves to the identifier.
    pub(crate) fn field_text(&self, field: &str) -> String {
        if field == "id" {
            return self.id.clone();
        }
        match self.fields.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl ListItem for Record {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("record id must not be empty".to_string());
        }
        if self.fields.is_empty() {
            return Err(format!("record {} has no fields", self.id));
        }
        Ok(())
    }
}

fn id_from_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(de::Error::custom(format!(
            "id must be a string or number, got {other}"
        ))),
    }
}

/// REST collection endpoint (`GET` list, `POST` create, `PUT`/`DELETE` by id).
pub(crate) struct HttpBackend {
    client: Client,
    collection: Url,
    api_key: Option<ApiKeyCredential>,
}

impl HttpBackend {
    pub(crate) const fn new(
        client: Client,
        collection: Url,
        api_key: Option<ApiKeyCredential>,
    ) -> Self {
        Self {
            client,
            collection,
            api_key,
        }
    }

    fn item_url(&self, operation: &'static str, id: &str) -> Result<Url, SourceError> {
        let mut url = self.collection.clone();
        url.path_segments_mut()
            .map_err(|()| SourceError::Transport {
                operation,
                message: format!("{} cannot carry a path", self.collection),
            })?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    fn prepare(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = match &self.api_key {
            Some(key) => builder.header(HEADER_API_KEY, key.header_value()),
            None => builder,
        };
        match CommandScope::current() {
            Some(scope) => builder
                .header(HEADER_REQUEST_ID, scope.trace_id())
                .header(HEADER_RESOURCE, scope.resource()),
            None => builder,
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, SourceError> {
        let response = self
            .prepare(builder)
            .send()
            .await
            .map_err(|err| transport_error(operation, &err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(operation, status = status.as_u16(), "backend rejected request");
        Err(classify_status(operation, status, body.trim()))
    }
}

#[async_trait]
impl ListBackend<Record> for HttpBackend {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        cancel: CancellationToken,
    ) -> Result<Value, SourceError> {
        let mut url = self.collection.clone();
        url.set_query(Some(&request.query));
        debug!(seq = request.seq, url = %url, "list request sent");
        let call = async {
            let response = self.send("list", self.client.get(url)).await?;
            response
                .json::<Value>()
                .await
                .map_err(|err| transport_error("list", &err))
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SourceError::Cancelled),
            result = call => result,
        }
    }

    async fn create(&self, item: &Record) -> Result<(), SourceError> {
        let builder = self.client.post(self.collection.clone()).json(item);
        self.send("create", builder).await.map(drop)
    }

    async fn update(&self, item: &Record) -> Result<(), SourceError> {
        let url = self.item_url("update", &item.id)?;
        self.send("update", self.client.put(url).json(item))
            .await
            .map(drop)
    }

    async fn delete(&self, id: &String) -> Result<(), SourceError> {
        let url = self.item_url("delete", id)?;
        self.send("delete", self.client.delete(url)).await.map(drop)
    }
}

fn transport_error(operation: &'static str, err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout { operation }
    } else {
        SourceError::Transport {
            operation,
            message: err.to_string(),
        }
    }
}

fn classify_status(operation: &'static str, status: StatusCode, body: &str) -> SourceError {
    let message = if body.is_empty() {
        format!("status {status}")
    } else {
        format!("status {status}: {body}")
    };
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SourceError::Rejected { operation, message }
        }
        StatusCode::NOT_FOUND | StatusCode::CONFLICT if operation != "list" => {
            SourceError::Conflict { operation, message }
        }
        _ => SourceError::Transport { operation, message },
    }
}
