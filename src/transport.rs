use crate::error::{MalformedResponse, TransportError};
use crate::sequence::FrameContext;
use crate::video::EncodedFrame;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;

/// Outcome of a request that reached the Analysis service with a 2xx status.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisReply {
    Structured(Value),
    Malformed(MalformedResponse),
}

impl AnalysisReply {
    /// Decode a response body, keeping undecodable bodies as a diagnostic
    /// rather than an error.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(value) => Self::Structured(value),
            Err(e) => Self::Malformed(MalformedResponse {
                reason: format!("{} ({} bytes)", e, body.len()),
            }),
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Malformed(_) => None,
        }
    }
}

/// Ships one encoded frame plus its context to the Analysis service.
///
/// Implementations never retry; the capture scheduler's next tick is the
/// retry.
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    async fn send(
        &self,
        frame: &EncodedFrame,
        context: &FrameContext,
    ) -> Result<AnalysisReply, TransportError>;
}

/// Multipart field names expected by the Analysis service.
#[derive(Debug, Clone)]
pub struct FieldNames {
    pub image: String,
    pub context: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            image: "image".to_string(),
            context: "context".to_string(),
        }
    }
}

pub struct HttpTransport {
    client: Client,
    url: String,
    fields: FieldNames,
}

impl HttpTransport {
    pub fn new(url: &str, fields: FieldNames, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build analysis HTTP client")?;

        Ok(Self {
            client,
            url: url.to_string(),
            fields,
        })
    }

    fn form(&self, frame: &EncodedFrame, context: &FrameContext) -> Result<Form, TransportError> {
        let image = Part::bytes(frame.bytes.clone())
            .file_name(EncodedFrame::FILE_NAME)
            .mime_str(EncodedFrame::MIME)?;
        let context = serde_json::to_string(context)?;

        Ok(Form::new()
            .part(self.fields.image.clone(), image)
            .text(self.fields.context.clone(), context))
    }
}

#[async_trait]
impl AnalysisTransport for HttpTransport {
    async fn send(
        &self,
        frame: &EncodedFrame,
        context: &FrameContext,
    ) -> Result<AnalysisReply, TransportError> {
        tracing::debug!(
            "Sending frame #{} ({}x{}, {} bytes) to {}",
            frame.sequence,
            frame.width,
            frame.height,
            frame.bytes.len(),
            self.url
        );

        let response = self
            .client
            .post(&self.url)
            .multipart(self.form(frame, context)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let reply = AnalysisReply::from_body(&body);
        if let AnalysisReply::Malformed(ref malformed) = reply {
            tracing::warn!("Frame #{}: {}", frame.sequence, malformed);
        }
        Ok(reply)
    }
}
