// 🔌 HTTP Client - RemoteService over the service's JSON API
// Synchronous request/response; no retries.

use crate::columns::ColumnSpec;
use crate::error::{ImportError, Result};
use crate::remote::{DeactivateResult, GroupingRecord, RemoteService, UpsertResult, WireRow};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::time::Duration;
use tracing::{debug, instrument};

/// Model/field pair the complement call flips to inactive
const DEACTIVATE_MODEL: &str = "ResidentInstance";
const DEACTIVATE_FIELD: &str = "isActive";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

pub struct HttpRemote {
    client: Client,
    uri: String,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImportError::transport("build HTTP client", e))?;

        Ok(HttpRemote {
            client,
            uri: uri.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.uri, path)
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| ImportError::InvalidConfig("remote session is not authenticated".to_string()))
    }

    /// Request body: static params first, then the call's own keys on top
    fn body(&self, params: &Map<String, JsonValue>) -> Result<Map<String, JsonValue>> {
        let mut body = params.clone();
        body.insert("token".to_string(), JsonValue::String(self.token()?.to_string()));
        Ok(body)
    }

    /// Query for the read endpoints: caller options plus the session token
    fn query(&self, options: &Map<String, JsonValue>) -> Result<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = options
            .iter()
            .filter(|(key, _)| key.as_str() != "token")
            .map(|(key, value)| {
                let value = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect();
        pairs.push(("token".to_string(), self.token()?.to_string()));
        Ok(pairs)
    }

    fn get_records(
        &self,
        context: &str,
        path: &str,
        options: &Map<String, JsonValue>,
    ) -> Result<Vec<Map<String, JsonValue>>> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(&self.query(options)?)
            .send()
            .map_err(|e| ImportError::transport(context, e))?;

        let records: Vec<Map<String, JsonValue>> = Self::read_json(context, response)?;
        debug!(count = records.len(), path, "received records");
        Ok(records)
    }

    /// Residents matching `options` (sent as query parameters)
    #[instrument(level = "info", skip(self))]
    pub fn get_residents(&self, options: &Map<String, JsonValue>) -> Result<Vec<Map<String, JsonValue>>> {
        self.get_records("get residents", "resident", options)
    }

    /// Rooms matching `options` (sent as query parameters)
    #[instrument(level = "info", skip(self))]
    pub fn get_rooms(&self, options: &Map<String, JsonValue>) -> Result<Vec<Map<String, JsonValue>>> {
        self.get_records("get rooms", "room", options)
    }

    fn read_json<T: DeserializeOwned>(context: &str, response: Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ImportError::transport(context, e))?;

        if !status.is_success() {
            return Err(ImportError::Status {
                context: context.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|_| ImportError::Decode {
            context: context.to_string(),
            body,
        })
    }
}

impl RemoteService for HttpRemote {
    #[instrument(level = "info", skip(self, secret))]
    fn authenticate(&mut self, key: &str, secret: &str) -> Result<String> {
        let context = "authenticate";
        let response = self
            .client
            .post(self.endpoint("auth"))
            .json(&json!({"key": key, "secret": secret}))
            .send()
            .map_err(|e| ImportError::transport(context, e))?;

        let auth: AuthResponse = Self::read_json(context, response)?;
        self.token = Some(auth.token.clone());
        Ok(auth.token)
    }

    #[instrument(level = "info", skip(self))]
    fn list_groupings(&mut self, active_only: bool, include_id: bool) -> Result<Vec<GroupingRecord>> {
        let context = "list groupings";
        let active = if active_only { "1" } else { "0" };
        let response = self
            .client
            .get(self.endpoint("instance"))
            .query(&[("token", self.token()?), ("active", active)])
            .send()
            .map_err(|e| ImportError::transport(context, e))?;

        let objects: Vec<Map<String, JsonValue>> = Self::read_json(context, response)?;
        debug!(count = objects.len(), "received groupings");
        objects
            .into_iter()
            .map(|object| GroupingRecord::from_remote(object, include_id))
            .collect()
    }

    #[instrument(level = "info", skip_all, fields(rows = rows.len()))]
    fn upsert_batch(
        &mut self,
        columns: &[ColumnSpec],
        rows: &[WireRow],
        params: &Map<String, JsonValue>,
    ) -> Result<UpsertResult> {
        let context = "upsert batch";
        let mut body = self.body(params)?;
        body.insert("columns".to_string(), json!(columns));
        body.insert("data".to_string(), json!(rows));

        let response = self
            .client
            .put(self.endpoint("resident"))
            .json(&body)
            .send()
            .map_err(|e| ImportError::transport(context, e))?;

        Self::read_json(context, response)
    }

    #[instrument(level = "info", skip_all, fields(survivors = survivors.len()))]
    fn deactivate_complement(
        &mut self,
        metadata: &Map<String, JsonValue>,
        survivors: &[String],
    ) -> Result<DeactivateResult> {
        let context = "deactivate complement";
        let mut body = self.body(metadata)?;
        body.insert("residents".to_string(), json!(survivors));
        body.insert(
            "data".to_string(),
            json!({"model": DEACTIVATE_MODEL, "field": DEACTIVATE_FIELD, "value": false}),
        );

        let response = self
            .client
            .post(self.endpoint("resident/update_complement"))
            .json(&body)
            .send()
            .map_err(|e| ImportError::transport(context, e))?;

        Self::read_json(context, response)
    }
}
