// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Agent output model
//
// These are the canonical types both producer paths emit and the client
// accumulator consumes. Upstream parts are loosely shaped JSON; `Part::from_value`
// is the single place where that shape is validated.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A function invocation requested by the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub name: String,
    /// Parsed JSON arguments (not a raw string).
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The result of a function invocation, reported back by the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The primary payload of a part. A part carries exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum PartPayload {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

/// The atomic unit of agent output.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub payload: PartPayload,
    /// Internal reasoning rather than user-facing content.
    pub thought: bool,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: PartPayload::Text(text.into()),
            thought: false,
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            payload: PartPayload::Text(text.into()),
            thought: true,
        }
    }

    pub fn function_call(name: impl Into<String>, args: Value, id: Option<String>) -> Self {
        Self {
            payload: PartPayload::FunctionCall(FunctionCall {
                name: name.into(),
                args,
                id,
            }),
            thought: false,
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value, id: Option<String>) -> Self {
        Self {
            payload: PartPayload::FunctionResponse(FunctionResponse {
                name: name.into(),
                response,
                id,
            }),
            thought: false,
        }
    }

    /// Text content, if this is a text part (thought or not).
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            PartPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self.payload, PartPayload::FunctionCall(_))
    }

    /// Build a part from an arbitrary JSON value.
    ///
    /// Returns `None` when the value has no recognizable payload. Precedence
    /// when several are present: text, then function call, then function
    /// response. Both snake_case and camelCase descriptor keys are accepted;
    /// `thought: null` counts as `false`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let thought = obj.get("thought").and_then(Value::as_bool).unwrap_or(false);

        let payload = if let Some(text) = obj.get("text").and_then(Value::as_str) {
            PartPayload::Text(text.to_owned())
        } else if let Some(call) = descriptor(obj, "function_call", "functionCall") {
            PartPayload::FunctionCall(FunctionCall {
                name: call.get("name")?.as_str()?.to_owned(),
                args: call
                    .get("args")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
                id: optional_string(call, "id"),
            })
        } else if let Some(resp) = descriptor(obj, "function_response", "functionResponse") {
            PartPayload::FunctionResponse(FunctionResponse {
                name: resp.get("name")?.as_str()?.to_owned(),
                response: resp
                    .get("response")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
                id: optional_string(resp, "id"),
            })
        } else {
            return None;
        };

        Some(Self { payload, thought })
    }
}

fn descriptor<'a>(obj: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Map<String, Value>> {
    obj.get(snake)
        .or_else(|| obj.get(camel))
        .and_then(Value::as_object)
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.thought { 2 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        match &self.payload {
            PartPayload::Text(text) => map.serialize_entry("text", text)?,
            PartPayload::FunctionCall(call) => map.serialize_entry("function_call", call)?,
            PartPayload::FunctionResponse(resp) => map.serialize_entry("function_response", resp)?,
        }
        if self.thought {
            map.serialize_entry("thought", &true)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Part::from_value(&value).ok_or_else(|| de::Error::custom("unrecognized part shape"))
    }
}

/// The `content` object of an envelope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One transport frame: a part plus the agent that produced it.
///
/// Once emitted an envelope is never revised; consumers treat every arrival
/// as additive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub content: Content,
    pub author: String,
    #[serde(
        rename = "usageMetadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub usage_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Value>,
}

impl Envelope {
    /// Wrap exactly one part.
    pub fn single(author: impl Into<String>, part: Part) -> Self {
        Self {
            content: Content { parts: vec![part] },
            author: author.into(),
            usage_metadata: None,
            actions: None,
        }
    }
}
