//! Nautobot REST inventory client
//!
//! Engine records use flat field names; Nautobot nests references, choice
//! fields, and custom fields. A per-kind field table drives translation in
//! both directions:
//! - outgoing payloads and filter query parameters
//! - incoming records, where nested objects collapse to their id or name

use async_trait::async_trait;
use fleetsync_core::{EntityKind, Fields, Record, RecordId};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, trace};

use crate::client::{Inventory, InventoryError, InventoryResult};

/// Connection settings for a Nautobot instance
#[derive(Debug, Clone)]
pub struct NautobotConfig {
    /// Base URL, e.g. "https://nautobot.example.net"
    pub url: String,
    /// API token
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Page size requested for list calls
    pub page_size: u32,
}

impl Default for NautobotConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            token: String::new(),
            timeout: Duration::from_secs(15),
            page_size: 250,
        }
    }
}

/// How one engine field is represented in the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiField {
    /// Same name, scalar value
    Plain(&'static str),
    /// Choice field: written as a slug, read back from `{"value": ..}`
    Choice(&'static str),
    /// Reference by id: written as the id, read from `{"id": ..}`
    RefId(&'static str),
    /// Reference by name: written and read as `{"name": ..}`
    RefName(&'static str),
    /// Stored under `custom_fields`
    Custom(&'static str),
    /// Generic assignment to a dcim.interface
    AssignedInterface,
}

fn field_table(kind: EntityKind) -> &'static [(&'static str, ApiField)] {
    use ApiField::*;
    match kind {
        EntityKind::Site => &[("name", Plain("name")), ("status", Choice("status"))],
        EntityKind::DeviceType => &[
            ("model", Plain("model")),
            ("manufacturer", RefName("manufacturer")),
        ],
        EntityKind::Device => &[
            ("name", Plain("name")),
            ("device_type", RefId("device_type")),
            ("site", RefId("site")),
            ("role", RefName("device_role")),
            ("serial", Plain("serial")),
            ("status", Choice("status")),
        ],
        EntityKind::Interface => &[
            ("device", RefId("device")),
            ("name", Plain("name")),
            ("type", Choice("type")),
            ("description", Plain("description")),
            ("mac_address", Plain("mac_address")),
            ("default_name", Custom("default_name")),
            ("status", Choice("status")),
        ],
        EntityKind::Prefix => &[("prefix", Plain("prefix")), ("status", Choice("status"))],
        EntityKind::IpAddress => &[
            ("address", Plain("address")),
            ("status", Choice("status")),
            ("description", Plain("description")),
            ("role", Choice("role")),
            ("assigned_interface", AssignedInterface),
        ],
    }
}

fn api_field(kind: EntityKind, field: &str) -> Option<ApiField> {
    field_table(kind)
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, api)| *api)
}

/// REST path of the collection holding `kind`
pub fn endpoint(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Site => "dcim/sites",
        EntityKind::DeviceType => "dcim/device-types",
        EntityKind::Device => "dcim/devices",
        EntityKind::Interface => "dcim/interfaces",
        EntityKind::Prefix => "ipam/prefixes",
        EntityKind::IpAddress => "ipam/ip-addresses",
    }
}

/// Translate engine fields into a request body
pub fn to_payload(kind: EntityKind, fields: &Fields) -> Value {
    let mut body = Map::new();
    let mut custom = Map::new();

    for (field, value) in fields {
        match api_field(kind, field) {
            Some(ApiField::Plain(name)) | Some(ApiField::Choice(name)) | Some(ApiField::RefId(name)) => {
                body.insert(name.to_string(), value.clone());
            }
            Some(ApiField::RefName(name)) => {
                let nested = match value {
                    Value::Null => Value::Null,
                    v => json!({ "name": v }),
                };
                body.insert(name.to_string(), nested);
            }
            Some(ApiField::Custom(name)) => {
                custom.insert(name.to_string(), value.clone());
            }
            Some(ApiField::AssignedInterface) => {
                let object_type = if value.is_null() {
                    Value::Null
                } else {
                    json!("dcim.interface")
                };
                body.insert("assigned_object_type".to_string(), object_type);
                body.insert("assigned_object_id".to_string(), value.clone());
            }
            // Fields outside the table pass through untouched
            None => {
                body.insert(field.clone(), value.clone());
            }
        }
    }

    if !custom.is_empty() {
        body.insert("custom_fields".to_string(), Value::Object(custom));
    }
    Value::Object(body)
}

/// Translate natural-key filters into query parameters
pub fn filter_params(kind: EntityKind, filters: &[(&str, &str)]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(field, value)| {
            let param = match api_field(kind, field) {
                Some(ApiField::Plain(name)) | Some(ApiField::Choice(name)) => name.to_string(),
                Some(ApiField::RefId(name)) => format!("{}_id", name),
                Some(ApiField::RefName(name)) => name.to_string(),
                Some(ApiField::Custom(name)) => format!("cf_{}", name),
                Some(ApiField::AssignedInterface) => "interface_id".to_string(),
                None => field.to_string(),
            };
            (param, value.to_string())
        })
        .collect()
}

/// Collapse an API object into an engine record
pub fn from_api(kind: EntityKind, value: &Value) -> InventoryResult<Record> {
    let id = match value.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(InventoryError::InvalidResponse(format!(
                "{} object without id",
                kind
            )))
        }
    };

    let mut fields = Fields::new();
    for (field, api) in field_table(kind) {
        let extracted = match api {
            ApiField::Plain(name) => value.get(*name).cloned(),
            ApiField::Choice(name) => value.get(*name).map(|v| nested_or_self(v, "value")),
            ApiField::RefId(name) => value.get(*name).map(|v| nested_or_self(v, "id")),
            ApiField::RefName(name) => value.get(*name).map(|v| nested_or_self(v, "name")),
            ApiField::Custom(name) => value
                .get("custom_fields")
                .and_then(|cf| cf.get(*name))
                .cloned(),
            ApiField::AssignedInterface => {
                match value.get("assigned_object_type").and_then(Value::as_str) {
                    Some("dcim.interface") => value
                        .get("assigned_object_id")
                        .map(|v| nested_or_self(v, "id")),
                    _ => Some(Value::Null),
                }
            }
        };
        if let Some(v) = extracted {
            fields.insert(field.to_string(), stringify_id(v));
        }
    }

    Ok(Record {
        id: RecordId(id),
        kind,
        fields,
    })
}

/// `{"key": x, ..}` becomes `x`; anything else is returned as-is
fn nested_or_self(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(obj) => obj.get(key).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Numeric ids are compared as strings by the engine
fn stringify_id(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        other => other,
    }
}

/// Map a non-success response to the error taxonomy
fn classify(kind: EntityKind, id: Option<&RecordId>, status: StatusCode, body: &str) -> InventoryError {
    let lowered = body.to_lowercase();
    match status {
        StatusCode::NOT_FOUND => match id {
            Some(id) => InventoryError::NotFound {
                kind,
                id: id.clone(),
            },
            None => InventoryError::Rejected {
                status: status.as_u16(),
                message: body.to_string(),
            },
        },
        StatusCode::CONFLICT => InventoryError::Conflict {
            kind,
            message: body.to_string(),
        },
        StatusCode::BAD_REQUEST
            if lowered.contains("already exists") || lowered.contains("unique") =>
        {
            InventoryError::Conflict {
                kind,
                message: body.to_string(),
            }
        }
        StatusCode::TOO_MANY_REQUESTS => {
            InventoryError::Transport(format!("rate limited: {}", body))
        }
        s if s.is_server_error() => InventoryError::Transport(format!("server error {}: {}", s, body)),
        s => InventoryError::Rejected {
            status: s.as_u16(),
            message: body.to_string(),
        },
    }
}

fn transport(e: reqwest::Error) -> InventoryError {
    InventoryError::Transport(e.to_string())
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

/// Inventory client for the Nautobot REST API
pub struct NautobotClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
}

impl NautobotClient {
    pub fn new(config: NautobotConfig) -> InventoryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InventoryError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token,
            page_size: config.page_size,
        })
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/api/{}/", self.base_url, endpoint(kind))
    }

    fn detail_url(&self, kind: EntityKind, id: &RecordId) -> String {
        format!("{}/api/{}/{}/", self.base_url, endpoint(kind), id)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Send a request and return the JSON body, or the classified error
    async fn send(
        &self,
        kind: EntityKind,
        id: Option<&RecordId>,
        builder: reqwest::RequestBuilder,
    ) -> InventoryResult<Option<Value>> {
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(classify(kind, id, status, &body));
        }
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| InventoryError::InvalidResponse(e.to_string()))
    }

    async fn send_record(
        &self,
        kind: EntityKind,
        id: Option<&RecordId>,
        builder: reqwest::RequestBuilder,
    ) -> InventoryResult<Record> {
        match self.send(kind, id, builder).await? {
            Some(value) => from_api(kind, &value),
            None => Err(InventoryError::InvalidResponse(format!(
                "empty {} response",
                kind
            ))),
        }
    }
}

#[async_trait]
impl Inventory for NautobotClient {
    async fn filter(
        &self,
        kind: EntityKind,
        filters: &[(&str, &str)],
    ) -> InventoryResult<Vec<Record>> {
        let mut params = filter_params(kind, filters);
        params.push(("limit".to_string(), self.page_size.to_string()));

        debug!(kind = %kind, filters = ?filters, "Filtering inventory");

        let mut records = Vec::new();
        let mut builder = self
            .request(Method::GET, &self.collection_url(kind))
            .query(&params);

        loop {
            let value = self.send(kind, None, builder).await?.unwrap_or(Value::Null);
            let page: Page = serde_json::from_value(value)
                .map_err(|e| InventoryError::InvalidResponse(e.to_string()))?;
            for item in &page.results {
                records.push(from_api(kind, item)?);
            }
            match page.next {
                // The next link already carries every query parameter
                Some(next) => builder = self.request(Method::GET, &next),
                None => break,
            }
        }

        trace!(kind = %kind, matches = records.len(), "Filter complete");
        Ok(records)
    }

    async fn create(&self, kind: EntityKind, fields: &Fields) -> InventoryResult<Record> {
        let builder = self
            .request(Method::POST, &self.collection_url(kind))
            .json(&to_payload(kind, fields));
        let record = self.send_record(kind, None, builder).await?;
        debug!(kind = %kind, id = %record.id, "Created inventory record");
        Ok(record)
    }

    async fn update(&self, record: &Record, fields: &Fields) -> InventoryResult<Record> {
        let builder = self
            .request(Method::PATCH, &self.detail_url(record.kind, &record.id))
            .json(&to_payload(record.kind, fields));
        let updated = self.send_record(record.kind, Some(&record.id), builder).await?;
        debug!(kind = %record.kind, id = %record.id, "Updated inventory record");
        Ok(updated)
    }

    async fn delete(&self, record: &Record) -> InventoryResult<()> {
        let builder = self.request(Method::DELETE, &self.detail_url(record.kind, &record.id));
        self.send(record.kind, Some(&record.id), builder).await?;
        debug!(kind = %record.kind, id = %record.id, "Deleted inventory record");
        Ok(())
    }
}
