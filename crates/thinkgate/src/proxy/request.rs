//! Validation of incoming generate and chat bodies

use serde_json::Value;

use crate::thinking::PayloadKind;

use super::ProxyError;

/// The parts of a generate or chat request the proxy needs to route it.
///
/// The incoming body is forwarded as-is; this is only a validated view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub kind: PayloadKind,
    pub model: String,
    /// The client's streaming preference, `true` when omitted
    pub stream: bool,
}

impl InferenceRequest {
    pub fn parse(kind: PayloadKind, body: &[u8]) -> Result<Self, ProxyError> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| ProxyError::InvalidRequest(format!("invalid JSON body: {e}")))?;
        Self::from_payload(kind, &payload)
    }

    pub fn from_payload(kind: PayloadKind, payload: &Value) -> Result<Self, ProxyError> {
        if !payload.is_object() {
            return Err(ProxyError::InvalidRequest(
                "request body must be a JSON object".to_string(),
            ));
        }

        let model = payload
            .get("model")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ProxyError::InvalidRequest("model is required".to_string()))?;

        match kind {
            // A bare keep_alive request loads or unloads a model without a prompt
            PayloadKind::Generate => {
                let has_prompt = payload.get("prompt").is_some_and(Value::is_string);
                if !has_prompt && payload.get("keep_alive").is_none() {
                    return Err(ProxyError::InvalidRequest("prompt is required".to_string()));
                }
            }
            PayloadKind::Chat => {
                if !payload.get("messages").is_some_and(Value::is_array) {
                    return Err(ProxyError::InvalidRequest(
                        "messages must be an array".to_string(),
                    ));
                }
            }
        }

        let stream = payload.get("stream").and_then(Value::as_bool).unwrap_or(true);

        Ok(Self {
            kind,
            model: model.to_string(),
            stream,
        })
    }
}
