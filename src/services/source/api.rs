// REST API source
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value as JsonValue;

use super::adapter::RowSource;
use super::batch_from_json;
use super::selector::Selector;
use crate::error::{ConvertError, Result};
use crate::models::Batch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(ConvertError::Validation(format!(
                "unsupported HTTP method '{}' (expected GET or POST)",
                other
            ))),
        }
    }
}

/// Raw request options as given on the command line
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub url: String,
    pub method: String,
    /// JSON object of header names to values
    pub headers: Option<String>,
    /// `user:password` for basic auth
    pub auth: Option<String>,
    /// JSON request body, sent with POST
    pub data: Option<String>,
    /// Selector locating the records in the response
    pub path: Option<String>,
    pub timeout_secs: u64,
}

/// Fetches one JSON document and yields its records as a single batch
pub struct ApiSource {
    url: reqwest::Url,
    method: HttpMethod,
    headers: HeaderMap,
    auth: Option<(String, String)>,
    body: Option<JsonValue>,
    selector: Option<Selector>,
    client: reqwest::Client,
    fetched: bool,
}

impl ApiSource {
    /// Validate every request option up front, before any network traffic
    pub fn new(request: ApiRequest) -> Result<Self> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| ConvertError::Validation(format!("invalid API URL '{}': {}", request.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConvertError::Validation(format!(
                "API URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        let method = HttpMethod::from_str(&request.method)?;
        let headers = match request.headers.as_deref() {
            Some(raw) => parse_headers(raw)?,
            None => HeaderMap::new(),
        };
        let auth = request.auth.as_deref().map(parse_auth).transpose()?;
        let body = request
            .data
            .as_deref()
            .map(|raw| {
                serde_json::from_str::<JsonValue>(raw)
                    .map_err(|e| ConvertError::Validation(format!("request data is not valid JSON: {}", e)))
            })
            .transpose()?;
        let selector = request.path.as_deref().map(Selector::parse).transpose()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(request.timeout_secs))
            .build()
            .map_err(|e| ConvertError::Validation(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            url,
            method,
            headers,
            auth,
            body,
            selector,
            client,
            fetched: false,
        })
    }

    async fn fetch(&self) -> Result<JsonValue> {
        let mut builder = match self.method {
            HttpMethod::Get => self.client.get(self.url.clone()),
            HttpMethod::Post => self.client.post(self.url.clone()),
        };
        builder = builder.headers(self.headers.clone());
        if let Some((user, password)) = &self.auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if let (HttpMethod::Post, Some(body)) = (self.method, &self.body) {
            builder = builder.json(body);
        }

        tracing::info!("Requesting {:?} {}", self.method, self.url);
        let response = builder
            .send()
            .await
            .map_err(|e| ConvertError::SourceRead(format!("API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConvertError::SourceRead(format!(
                "API responded with HTTP {}",
                status
            )));
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|e| ConvertError::SourceRead(format!("API response is not valid JSON: {}", e)))
    }
}

fn parse_headers(raw: &str) -> Result<HeaderMap> {
    let parsed: JsonValue = serde_json::from_str(raw)
        .map_err(|e| ConvertError::Validation(format!("headers are not valid JSON: {}", e)))?;
    let JsonValue::Object(entries) = parsed else {
        return Err(ConvertError::Validation("headers must be a JSON object".to_string()));
    };

    let mut headers = HeaderMap::new();
    for (name, value) in entries {
        let value = match value {
            JsonValue::String(s) => s,
            other => other.to_string(),
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConvertError::Validation(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| ConvertError::Validation(format!("invalid value for header '{}': {}", name, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn parse_auth(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((user, password)) if !user.is_empty() => Ok((user.to_string(), password.to_string())),
        _ => Err(ConvertError::Validation(
            "auth must be given as 'user:password'".to_string(),
        )),
    }
}

/// Turn a response document into rows.
///
/// Without a selector the document itself is the dataset. With one, each match
/// becomes a row, except that a single array match is expanded into its items.
pub fn extract_records(document: JsonValue, selector: Option<&Selector>) -> Result<Batch> {
    let nodes: Vec<JsonValue> = match selector {
        None => match document {
            JsonValue::Array(items) => items,
            other => vec![other],
        },
        Some(selector) => {
            let matches = selector.select(&document);
            if matches.is_empty() {
                return Err(ConvertError::NoDataMatched(format!(
                    "selector '{}' matched nothing in the API response",
                    selector.as_str()
                )));
            }
            match matches.as_slice() {
                [JsonValue::Array(items)] => items.clone(),
                _ => matches.iter().map(|node| (*node).clone()).collect(),
            }
        }
    };

    if nodes.is_empty() {
        return Err(ConvertError::NoDataMatched(
            "the API response contains no records".to_string(),
        ));
    }
    Ok(batch_from_json(nodes))
}

#[async_trait::async_trait]
impl RowSource for ApiSource {
    fn describe(&self) -> String {
        format!("API {:?} {}", self.method, self.url)
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.fetched {
            return Ok(None);
        }
        self.fetched = true;
        let document = self.fetch().await?;
        let batch = extract_records(document, self.selector.as_ref())?;
        tracing::info!("API returned {} records", batch.len());
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.fetched = true;
        Ok(())
    }
}
