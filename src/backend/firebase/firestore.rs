//! Firestore REST documents and their typed value encoding.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{status_error, FirebaseClient};
use crate::backend::{DocumentStore, Fields};
use crate::error::{Result, VoiceError};

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Wraps a plain JSON value in Firestore's typed representation.
fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() } })
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

fn encode_fields(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode(value)))
        .collect()
}

/// Unwraps a typed Firestore value. Timestamps and references come back as strings.
fn decode(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "booleanValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "doubleValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Fields {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode(value)))
        .collect()
}

impl FirebaseClient {
    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents/{}/{}",
            self.config.project_id,
            collection,
            urlencoding::encode(id)
        )
    }
}

/// `updateMask.fieldPaths` query pairs restricting a write to `fields`.
fn update_mask(fields: &Fields) -> Vec<(&'static str, String)> {
    fields
        .keys()
        .map(|key| ("updateMask.fieldPaths", key.clone()))
        .collect()
}

#[async_trait]
impl DocumentStore for FirebaseClient {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Fields>> {
        let request = self
            .http
            .get(self.document_url(collection, id))
            .bearer_auth(self.token()?);
        let response = self.send(request, "Firestore").await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response, "Firestore").await);
        }

        let document: Document = response
            .json()
            .await
            .map_err(|e| VoiceError::Backend(format!("Failed to parse Firestore document: {e}")))?;
        Ok(Some(decode_fields(&document.fields)))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<()> {
        let mut request = self
            .http
            .patch(self.document_url(collection, id))
            .bearer_auth(self.token()?)
            .json(&json!({ "fields": encode_fields(&fields) }));
        if merge {
            request = request.query(&update_mask(&fields));
        }

        tracing::debug!(
            "Firestore write {}/{} (merge: {}, fields: {:?})",
            collection,
            id,
            merge,
            fields.keys().collect::<Vec<_>>()
        );
        let response = self.send(request, "Firestore").await?;
        if !response.status().is_success() {
            return Err(status_error(response, "Firestore").await);
        }
        Ok(())
    }
}
