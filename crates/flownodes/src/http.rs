use async_trait::async_trait;
use flowcore::{Flow, NodeError, Spec, Task, TaskContext, Value};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Request defaults shared by every execution of a [`Wreck`] flow
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WreckDefaults {
    pub base_url: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
}

impl WreckDefaults {
    /// Overlay `other` on top of these defaults.
    fn merge(mut self, other: WreckDefaults) -> Self {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        self.headers.extend(other.headers);
        self
    }
}

/// Builder for an outbound HTTP request flow.
///
/// The flow's input is `{ uri, options: { payload, headers } }`; `uri` is
/// resolved against the base URL. It resolves to
/// `{ status, headers, payload }`, the payload parsed as JSON when possible.
/// Non-2xx responses are values, not failures.
#[derive(Clone)]
pub struct Wreck {
    client: Client,
    method: Method,
    defaults: WreckDefaults,
}

pub fn wreck() -> Wreck {
    Wreck {
        client: Client::new(),
        method: Method::GET,
        defaults: WreckDefaults::default(),
    }
}

impl Wreck {
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn get(self, base: impl Into<String>) -> Self {
        self.request(Method::GET, base)
    }

    pub fn post(self, base: impl Into<String>) -> Self {
        self.request(Method::POST, base)
    }

    pub fn put(self, base: impl Into<String>) -> Self {
        self.request(Method::PUT, base)
    }

    pub fn patch(self, base: impl Into<String>) -> Self {
        self.request(Method::PATCH, base)
    }

    pub fn delete(self, base: impl Into<String>) -> Self {
        self.request(Method::DELETE, base)
    }

    pub fn defaults(mut self, defaults: WreckDefaults) -> Self {
        self.defaults = self.defaults.merge(defaults);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.headers.insert(name.into(), value.into());
        self
    }

    fn request(mut self, method: Method, base: impl Into<String>) -> Self {
        self.method = method;
        self.defaults.base_url = Some(base.into());
        self
    }

    pub fn flow(&self) -> Flow {
        Flow::adapter(
            "wreck",
            WreckTask {
                client: self.client.clone(),
                method: self.method.clone(),
                defaults: self.defaults.clone(),
            },
        )
    }
}

impl From<Wreck> for Flow {
    fn from(wreck: Wreck) -> Self {
        wreck.flow()
    }
}

impl From<Wreck> for Spec {
    fn from(wreck: Wreck) -> Self {
        Spec::Flow(wreck.flow())
    }
}

/// HTTP request task
pub struct WreckTask {
    client: Client,
    method: Method,
    defaults: WreckDefaults,
}

impl WreckTask {
    fn url(&self, uri: &str) -> Result<Url, NodeError> {
        let resolved = match self.defaults.base_url.as_deref().filter(|base| !base.is_empty()) {
            Some(base) => Url::parse(base).and_then(|base| base.join(uri)),
            None => Url::parse(uri),
        };
        resolved.map_err(|e| NodeError::Configuration(format!("Invalid request URI '{}': {}", uri, e)))
    }
}

#[async_trait]
impl Task for WreckTask {
    fn name(&self) -> &str {
        "wreck"
    }

    async fn execute(&self, ctx: TaskContext) -> Result<Value, NodeError> {
        let input = ctx.last_arg();
        let uri = match input.get("uri") {
            Some(Value::String(uri)) => uri,
            None | Some(Value::Null) => String::new(),
            Some(other) => {
                return Err(NodeError::InvalidInputType {
                    field: "uri".to_string(),
                    expected: "string".to_string(),
                    actual: other.kind().to_string(),
                })
            }
        };
        let options = input.get("options").unwrap_or_default();
        let url = self.url(&uri)?;

        ctx.events.info(format!("{} {}", self.method, url));
        tracing::debug!(label = %ctx.label, method = %self.method, %url, "Sending request");

        let mut request = self.client.request(self.method.clone(), url);
        for (name, value) in &self.defaults.headers {
            request = request.header(name, value);
        }
        if let Some(Value::Object(headers)) = options.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }

        request = match options.get("payload").unwrap_or_default() {
            Value::Null => request,
            Value::String(text) => request.body(text),
            Value::Bytes(bytes) => request.body(bytes),
            payload => request.json(&payload.to_json()),
        };

        let budget = ctx
            .deadline
            .map(|deadline| deadline.remaining())
            .into_iter()
            .chain(self.defaults.timeout_ms.map(Duration::from_millis))
            .min();
        if let Some(budget) = budget {
            request = request.timeout(budget);
        }

        ctx.events.progress(0.0, Some("Request sent".to_string()));
        let response = tokio::select! {
            response = request.send() => response
                .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?,
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        if !response.status().is_success() {
            ctx.events.warn(format!("Request returned status {}", status));
        }
        ctx.events.data("status", Value::Number(f64::from(status)));
        ctx.events.progress(50.0, Some("Headers received".to_string()));

        let body = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        ctx.events.progress(100.0, Some("Body received".to_string()));

        let payload = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str::<serde_json::Value>(&body)
                .map(Value::from_json)
                .unwrap_or(Value::String(body))
        };

        let mut output = HashMap::new();
        output.insert("status".to_string(), Value::Number(f64::from(status)));
        output.insert("headers".to_string(), Value::Object(headers));
        output.insert("payload".to_string(), payload);
        Ok(Value::Object(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_is_resolved_against_the_base() {
        let task = WreckTask {
            client: Client::new(),
            method: Method::GET,
            defaults: WreckDefaults {
                base_url: Some("http://localhost:8080/api/".to_string()),
                ..Default::default()
            },
        };

        assert_eq!(task.url("users/1").unwrap().as_str(), "http://localhost:8080/api/users/1");
        assert_eq!(task.url("").unwrap().as_str(), "http://localhost:8080/api/");
    }

    #[test]
    fn later_defaults_win() {
        let wreck = wreck()
            .post("http://a.test")
            .header("x-one", "1")
            .defaults(WreckDefaults {
                base_url: Some("http://b.test".to_string()),
                timeout_ms: Some(50),
                ..Default::default()
            });

        assert_eq!(wreck.method, Method::POST);
        assert_eq!(wreck.defaults.base_url.as_deref(), Some("http://b.test"));
        assert_eq!(wreck.defaults.headers.get("x-one").map(String::as_str), Some("1"));
        assert_eq!(wreck.defaults.timeout_ms, Some(50));
    }
}
