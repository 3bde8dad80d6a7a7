//! Primary generation backend: Gemini `streamGenerateContent` over a
//! line-oriented event stream, decoded incrementally.

use async_stream::stream;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Serialize;

use crate::config::GatewayConfig;
use crate::context::AssembledPrompt;
use crate::decoder::{LineProtocolDecoder, decode_event_line};
use crate::errors::{GatewayError, RelayError};

use super::ChatReply;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

fn build_request(prompt: &AssembledPrompt) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: prompt
            .contents()
            .into_iter()
            .map(|turn| Content {
                role: turn.role,
                parts: vec![Part { text: turn.text }],
            })
            .collect(),
        generation_config: GenerationConfig::default(),
    }
}

fn stream_url(config: &GatewayConfig, api_key: &str) -> String {
    format!(
        "{}/{}/{}:streamGenerateContent?key={}&alt=sse",
        config.gemini_base_url.trim_end_matches('/'),
        config.gemini_api_version,
        config.model_path(),
        api_key
    )
}

/// Call the primary backend and decode its event stream incrementally.
///
/// The first output chunk is emitted as soon as the first complete event
/// line arrives; the decode loop never waits for the whole response. Each
/// yielded chunk suspends until the sink accepts it, so the loop pulls the
/// next upstream chunk only after the previous output was taken.
pub(super) async fn call_primary(
    client: &reqwest::Client,
    config: &GatewayConfig,
    prompt: &AssembledPrompt,
) -> Result<ChatReply, GatewayError> {
    let api_key = config
        .gemini_api_key
        .as_deref()
        .ok_or(GatewayError::UpstreamConfig("GEMINI_API_KEY is not set"))?;

    let response = client
        .post(stream_url(config, api_key))
        .json(&build_request(prompt))
        .send()
        .await
        .map_err(GatewayError::upstream)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), %body, "primary backend returned an error");
        return Err(GatewayError::UpstreamCall {
            status: Some(status.as_u16()),
            message: body,
        });
    }

    let mut source = response.bytes_stream();
    let output = stream! {
        let mut decoder = LineProtocolDecoder::new();
        while let Some(next) = source.next().await {
            match next {
                Ok(chunk) => {
                    for line in decoder.push(&chunk) {
                        if let Some(text) = decode_event_line(&line) {
                            yield Ok(Bytes::from(text.into_bytes()));
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "primary stream failed mid-flight");
                    yield Err(RelayError::from(err));
                    return;
                }
            }
        }
        // Upstream end-of-input: flush a final possibly-unterminated line.
        if let Some(line) = decoder.finish() {
            if let Some(text) = decode_event_line(&line) {
                yield Ok(Bytes::from(text.into_bytes()));
            }
        }
    };

    Ok(ChatReply::stream(
        "text/plain; charset=utf-8",
        Box::pin(output),
    ))
}
