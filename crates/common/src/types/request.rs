// Stepwise - Java Execution Visualizer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Title used when the request carries none
pub const DEFAULT_TITLE: &str = "Java Visualizer";
/// Language tag used when the request carries none
pub const DEFAULT_LANGUAGE: &str = "Java";

/// Reasons a request payload is rejected before any tracing starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Body is not a JSON object
    #[error("Invalid JSON payload")]
    InvalidPayload,
    /// `code` is missing or blank
    #[error("Code is required")]
    MissingCode,
}

/// One named input case as submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    /// Case id (`input-N` when absent)
    pub id: String,
    /// Case label (`Input N` when absent)
    pub label: String,
    /// Textual value; `None` means no stdin and no argument text
    pub value: Option<String>,
}

/// A validated trace request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRequest {
    /// Source snippet, never blank
    pub code: String,
    /// Language tag
    pub language: String,
    /// Document title
    pub title: String,
    /// Input cases in request order
    pub inputs: Vec<RawInput>,
}

impl TraceRequest {
    /// Parse and validate a raw request body.
    pub fn from_json(body: &str) -> Result<Self, RequestError> {
        let payload: JsonValue = serde_json::from_str(body).map_err(|_| RequestError::InvalidPayload)?;
        Self::from_value(&payload)
    }

    /// Validate an already-decoded payload.
    ///
    /// String fields accept any scalar; non-object input entries are skipped and
    /// missing ids/labels are numbered by position among the accepted entries.
    pub fn from_value(payload: &JsonValue) -> Result<Self, RequestError> {
        let object = payload.as_object().ok_or(RequestError::InvalidPayload)?;

        let code = text_field(object, "code")
            .filter(|code| !code.trim().is_empty())
            .ok_or(RequestError::MissingCode)?;
        let language = text_field(object, "language").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let title = text_field(object, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let mut inputs = Vec::new();
        if let Some(JsonValue::Array(entries)) = object.get("inputs") {
            for entry in entries.iter().filter_map(JsonValue::as_object) {
                let position = inputs.len() + 1;
                inputs.push(RawInput {
                    id: text_field(entry, "id").unwrap_or_else(|| format!("input-{position}")),
                    label: text_field(entry, "label").unwrap_or_else(|| format!("Input {position}")),
                    value: text_field(entry, "value"),
                });
            }
        }

        Ok(Self { code, language, title, inputs })
    }

    /// A request for a single input case, as used by the one-shot CLI.
    pub fn single(code: impl Into<String>, title: Option<String>, input: Option<String>) -> Self {
        Self {
            code: code.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            inputs: vec![RawInput { id: "input-1".into(), label: "Input 1".into(), value: input }],
        }
    }
}

/// Render a field as text: strings verbatim, other values in their JSON form, null as absent.
fn text_field(object: &Map<String, JsonValue>, key: &str) -> Option<String> {
    match object.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
