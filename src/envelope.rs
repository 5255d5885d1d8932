//! Request and response envelopes exchanged with the hosting platform.
//!
//! The JSON shape is the API Gateway proxy integration: camelCase keys, a
//! string body, and an `isBase64Encoded` flag on both sides. Only the fields
//! the pipeline uses are modelled; every other event field is ignored on
//! deserialization.
//!
//! These mirrors keep the CLI build free of `http` and `aws_lambda_events`.
//! With the `lambda` feature the runtime speaks
//! `aws_lambda_events::apigw::ApiGatewayProxyRequest` /
//! `ApiGatewayProxyResponse`, converted here at the boundary.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Inbound request as delivered by the platform. Consumed once per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Raw body text, or base64 text when `is_base64_encoded` is set.
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    /// Single-valued headers with client casing.
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_base64_encoded: bool,
}

impl RequestEnvelope {
    /// Build an envelope carrying a single `Content-Type` header.
    pub fn new(body: impl Into<String>, content_type: &str, is_base64_encoded: bool) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self {
            body: body.into(),
            headers,
            is_base64_encoded,
        }
    }
}

/// Outbound response. Terminal: returned to the platform and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl ResponseEnvelope {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// API Gateway sends explicit `null` for absent bodies and header maps.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(feature = "lambda")]
mod apigw {
    use super::{RequestEnvelope, ResponseEnvelope};
    use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
    use aws_lambda_events::encodings::Body;
    use http::{HeaderMap, HeaderName, HeaderValue};
    use std::collections::BTreeMap;

    impl From<ApiGatewayProxyRequest> for RequestEnvelope {
        /// Single-valued headers come first; the first value of each name wins.
        fn from(event: ApiGatewayProxyRequest) -> Self {
            let mut headers = BTreeMap::new();
            for (name, value) in event.headers.iter().chain(event.multi_value_headers.iter()) {
                headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
            }
            Self {
                body: event.body.unwrap_or_default(),
                headers,
                is_base64_encoded: event.is_base64_encoded,
            }
        }
    }

    impl From<ResponseEnvelope> for ApiGatewayProxyResponse {
        fn from(response: ResponseEnvelope) -> Self {
            let mut headers = HeaderMap::new();
            for (name, value) in &response.headers {
                if let (Ok(name), Ok(value)) =
                    (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
                {
                    headers.insert(name, value);
                }
            }
            let mut proxy = ApiGatewayProxyResponse::default();
            proxy.status_code = i64::from(response.status_code);
            proxy.headers = headers;
            proxy.body = Some(Body::Text(response.body));
            proxy.is_base64_encoded = response.is_base64_encoded;
            proxy
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn proxy_request_converts_first_value_wins() {
            let mut event = ApiGatewayProxyRequest::default();
            event.headers.insert(
                "content-type",
                HeaderValue::from_static("multipart/form-data; boundary=X"),
            );
            event
                .multi_value_headers
                .append("content-type", HeaderValue::from_static("text/plain"));
            event.body = Some("aGVsbG8=".to_string());
            event.is_base64_encoded = true;

            let request = RequestEnvelope::from(event);
            assert_eq!(request.body, "aGVsbG8=");
            assert!(request.is_base64_encoded);
            assert_eq!(request.headers["content-type"], "multipart/form-data; boundary=X");
        }

        #[test]
        fn missing_body_is_empty() {
            let request = RequestEnvelope::from(ApiGatewayProxyRequest::default());
            assert!(request.body.is_empty());
            assert!(request.headers.is_empty());
        }

        #[test]
        fn response_converts_to_proxy_response() {
            let response = crate::response::reject("invalid file type");
            let proxy = ApiGatewayProxyResponse::from(response);
            assert_eq!(proxy.status_code, 400);
            assert!(!proxy.is_base64_encoded);
            assert!(matches!(proxy.body, Some(Body::Text(ref b)) if b == "invalid file type"));

            let png = crate::response::encode(b"\x89PNG\r\n\x1a\n\0\0");
            let proxy = ApiGatewayProxyResponse::from(png);
            assert_eq!(proxy.status_code, 200);
            assert!(proxy.is_base64_encoded);
            assert_eq!(proxy.headers["content-type"], "image/png");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_api_gateway_event_ignoring_extra_fields() {
        let json = r#"{
            "resource": "/shrink",
            "path": "/shrink",
            "httpMethod": "POST",
            "headers": {"Content-Type": "multipart/form-data; boundary=X"},
            "requestContext": {"stage": "prod"},
            "body": "aGVsbG8=",
            "isBase64Encoded": true
        }"#;
        let request: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(request.body, "aGVsbG8=");
        assert!(request.is_base64_encoded);
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("multipart/form-data; boundary=X")
        );
    }

    #[test]
    fn null_fields_become_defaults() {
        let json = r#"{"body": null, "headers": null, "isBase64Encoded": null}"#;
        let request: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(request, RequestEnvelope::default());
    }

    #[test]
    fn missing_fields_become_defaults() {
        let request: RequestEnvelope = serde_json::from_str("{}").unwrap();
        assert!(request.body.is_empty());
        assert!(request.headers.is_empty());
        assert!(!request.is_base64_encoded);
    }

    #[test]
    fn response_serializes_camel_case() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "image/png".to_string());
        let response = ResponseEnvelope {
            status_code: 200,
            headers,
            body: "iVBORw0KGgo=".to_string(),
            is_base64_encoded: true,
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["headers"]["Content-Type"], "image/png");
        assert_eq!(value["body"], "iVBORw0KGgo=");
        assert_eq!(value["isBase64Encoded"], true);
    }

    #[test]
    fn is_success_tracks_status_class() {
        let ok = ResponseEnvelope {
            status_code: 200,
            ..ResponseEnvelope::default()
        };
        let bad = ResponseEnvelope {
            status_code: 400,
            ..ResponseEnvelope::default()
        };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
