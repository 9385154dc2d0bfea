//! Human readable messages for API error responses

use reqwest::{Response, StatusCode};
use serde_json::Value;

/// Message used when a validation error carries no field messages
pub const INVALID_DATA: &str = "Error en los datos enviados";

/// Message used when nothing better can be figured out
pub const UNEXPECTED: &str = "Ha ocurrido un error inesperado";

/// Consumes an error response producing a message to show to the user
pub async fn message(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) => message_from_body(status, &body),
        Err(_) => status_message(status),
    }
}

/// Extracts the message from an error response body
///
/// `detail` and `message` fields are preferred. Otherwise the body is treated as field validation
/// errors and all messages are joined.
pub fn message_from_body(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(message)) => message,
        Ok(Value::Object(fields)) => {
            for key in ["detail", "message"] {
                if let Some(Value::String(message)) = fields.get(key) {
                    return message.clone();
                }
            }

            let messages: Vec<_> = fields.values().flat_map(field_messages).collect();
            if messages.is_empty() {
                INVALID_DATA.to_owned()
            } else {
                messages.join(", ")
            }
        }
        _ if !body.trim().is_empty() => body.trim().to_owned(),
        _ => status_message(status),
    }
}

fn field_messages(value: &Value) -> Vec<String> {
    match value {
        Value::String(message) => vec![message.clone()],
        Value::Array(items) => items.iter().flat_map(field_messages).collect(),
        Value::Null => vec![],
        other => vec![other.to_string()],
    }
}

fn status_message(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or(UNEXPECTED).to_owned()
}
