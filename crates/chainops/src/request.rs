use async_trait::async_trait;
use chaincore::{KeyedData, Operation, OperationError, OperationMetadata, RuntimeContext};
use serde_json::{json, Map, Value};

/// HTTP request operation
///
/// Options: `url`, `method` (default GET), `body` (string or JSON) and
/// `headers` as a list of `{ "header", "value" }` pairs. Non-2xx responses
/// reject with the response as payload.
pub struct RequestOperation {
    client: reqwest::Client,
}

impl RequestOperation {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for RequestOperation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operation for RequestOperation {
    fn operation_type(&self) -> &str {
        "request"
    }

    async fn handle(
        &self,
        _data: &KeyedData,
        options: Value,
        _ctx: &RuntimeContext,
    ) -> Result<Value, OperationError> {
        let url = options
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| OperationError::MissingOption("url".to_string()))?;
        let method = options
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| OperationError::invalid_option("method", "an HTTP method"))?;

        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);

        if let Some(Value::Array(headers)) = options.get("headers") {
            for entry in headers {
                let name = entry.get("header").and_then(Value::as_str);
                let value = entry.get("value").and_then(Value::as_str);
                if let (Some(name), Some(value)) = (name, value) {
                    request = request.header(name, value);
                }
            }
        }

        request = match options.get("body") {
            None | Some(Value::Null) => request,
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(json) => request.json(&json),
                Err(_) => request.body(text.clone()),
            },
            Some(json) => request.json(json),
        };

        let response = request
            .send()
            .await
            .map_err(|e| OperationError::Failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| OperationError::Failed(format!("Failed to read response: {}", e)))?;
        let data = serde_json::from_str(&body_text).unwrap_or(Value::String(body_text));

        let result = json!({
            "status": status.as_u16(),
            "statusText": status.canonical_reason().unwrap_or(""),
            "headers": headers,
            "data": data,
        });

        if status.is_success() {
            Ok(result)
        } else {
            Err(OperationError::Rejected(result))
        }
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
        }
    }
}
