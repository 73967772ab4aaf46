//! One network exchange with the remote classification service.
//!
//! [`HttpClassifier`] encodes an accepted image, POSTs it once and maps the
//! outcome onto [`ClassificationError`]. Retrying is the caller's business.

use crate::models::{
    ClassificationResult, EndpointSettings, ImageCandidate, Prediction, TransportEncoding,
};
use crate::services::ClassificationError;
use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Longest server error body kept in [`ClassificationError::Server`]
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Encoded image body for one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    /// `data:<mime>;base64,<data>` sent as `{"image": ...}`
    DataUri(String),
    /// Raw bytes sent as the multipart field `image`
    Binary {
        file_name: String,
        mime: String,
        bytes: Bytes,
    },
}

/// An immutable, fully encoded classification request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRequest {
    payload: RequestPayload,
    source_bytes: u64,
}

impl ClassificationRequest {
    pub fn encode(
        candidate: &ImageCandidate,
        encoding: TransportEncoding,
    ) -> Result<Self, ClassificationError> {
        if candidate.bytes().is_empty() {
            return Err(ClassificationError::Encoding(format!(
                "{} is empty",
                candidate.file_name()
            )));
        }

        let payload = match encoding {
            TransportEncoding::DataUri => RequestPayload::DataUri(format!(
                "data:{};base64,{}",
                candidate.declared_mime(),
                STANDARD.encode(candidate.bytes())
            )),
            TransportEncoding::Multipart => RequestPayload::Binary {
                file_name: candidate.file_name().to_string(),
                mime: candidate.declared_mime().to_string(),
                bytes: candidate.bytes().clone(),
            },
        };

        tracing::debug!(
            "Encoded {} ({} bytes) as {:?}",
            candidate.file_name(),
            candidate.byte_size(),
            encoding
        );

        Ok(Self {
            payload,
            source_bytes: candidate.byte_size(),
        })
    }

    pub fn payload(&self) -> &RequestPayload {
        &self.payload
    }

    pub fn encoding(&self) -> TransportEncoding {
        match self.payload {
            RequestPayload::DataUri(_) => TransportEncoding::DataUri,
            RequestPayload::Binary { .. } => TransportEncoding::Multipart,
        }
    }

    /// Size of the image before encoding
    pub fn source_bytes(&self) -> u64 {
        self.source_bytes
    }
}

/// Something that can classify an encoded image.
///
/// [`HttpClassifier`] is the production implementation; tests drive the
/// controller with scripted implementations.
pub trait Classifier: Send + Sync {
    /// Encoding requests for this backend should use
    fn encoding(&self) -> TransportEncoding;

    /// Perform exactly one exchange.
    fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> impl Future<Output = Result<ClassificationResult, ClassificationError>> + Send;
}

/// reqwest-backed client for the classification endpoint.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    encoding: TransportEncoding,
}

impl HttpClassifier {
    pub fn new(settings: &EndpointSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let url = settings.classify_url();
        tracing::info!(
            "Classifier endpoint {} (timeout {:?}, {:?})",
            url,
            settings.request_timeout(),
            settings.encoding
        );

        Ok(Self {
            client,
            url,
            timeout: settings.request_timeout(),
            encoding: settings.encoding,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Encode `candidate` and classify it in one exchange.
    pub async fn submit(
        &self,
        candidate: &ImageCandidate,
    ) -> Result<ClassificationResult, ClassificationError> {
        let request = ClassificationRequest::encode(candidate, self.encoding)?;
        self.classify(&request).await
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ClassificationError {
        if e.is_timeout() {
            ClassificationError::Timeout(self.timeout)
        } else if e.is_decode() {
            ClassificationError::Parse(e.to_string())
        } else {
            // connect failures, resets and truncated bodies all mean the
            // exchange never completed
            ClassificationError::NetworkUnreachable(e.to_string())
        }
    }
}

impl Classifier for HttpClassifier {
    fn encoding(&self) -> TransportEncoding {
        self.encoding
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResult, ClassificationError> {
        let builder = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json");

        let builder = match request.payload() {
            RequestPayload::DataUri(uri) => builder.json(&serde_json::json!({ "image": uri })),
            RequestPayload::Binary {
                file_name,
                mime,
                bytes,
            } => {
                let part = Part::bytes(bytes.to_vec())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| ClassificationError::Encoding(e.to_string()))?;
                builder.multipart(Form::new().part("image", part))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        tracing::debug!("Classifier responded with HTTP {}", status.as_u16());

        match status {
            StatusCode::SERVICE_UNAVAILABLE => return Err(ClassificationError::ServiceWarming),
            StatusCode::PAYLOAD_TOO_LARGE => return Err(ClassificationError::PayloadTooLarge),
            s if !s.is_success() => {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::debug!(
                            "Could not read body of HTTP {} response: {}",
                            s.as_u16(),
                            e
                        );
                        String::new()
                    }
                };
                return Err(ClassificationError::Server {
                    status: s.as_u16(),
                    body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
                });
            }
            _ => {}
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        parse_predictions(&body)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PredictionsBody {
    Wrapped { predictions: Vec<Prediction> },
    Bare(Vec<Prediction>),
}

/// Parse a success body: `{"predictions": [...]}` or a bare array.
pub fn parse_predictions(body: &[u8]) -> Result<ClassificationResult, ClassificationError> {
    let parsed: PredictionsBody = serde_json::from_slice(body).map_err(|e| {
        ClassificationError::Parse(format!("response is not a predictions list: {}", e))
    })?;

    let predictions = match parsed {
        PredictionsBody::Wrapped { predictions } => predictions,
        PredictionsBody::Bare(predictions) => predictions,
    };

    for (i, prediction) in predictions.iter().enumerate() {
        if prediction.class_name.trim().is_empty() {
            return Err(ClassificationError::Parse(format!(
                "prediction {} has an empty class",
                i
            )));
        }
        if !(0.0..=1.0).contains(&prediction.confidence) {
            return Err(ClassificationError::Parse(format!(
                "prediction {} ({}) has confidence {} outside [0, 1]",
                i, prediction.class_name, prediction.confidence
            )));
        }
    }

    Ok(ClassificationResult::new(predictions))
}
