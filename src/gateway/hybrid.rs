//! Hybrid (retrieval-augmented) backend call and response normalization.
//!
//! The hybrid payload intentionally duplicates the prompt under several key
//! names (`system`/`context`/`messages` plus the `additionalProp1` echo) for
//! compatibility with heterogeneous consumers of that endpoint; see
//! DESIGN.md before changing the wire contract.

use futures_util::StreamExt;
use serde_json::{Value, json};

use crate::config::GatewayConfig;
use crate::context::AssembledPrompt;
use crate::errors::{GatewayError, RelayError};
use crate::relay::{PREVIEW_CHAR_CAP, preview_stream};

use super::ChatReply;

/// Retrieval tuning forwarded to the hybrid backend.
const HYBRID_K: u32 = 6;
const HYBRID_PROBES: u32 = 12;

pub(super) fn build_payload(prompt: &AssembledPrompt) -> Value {
    let messages: Vec<Value> = prompt
        .turns
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role,
                "parts": [{ "text": turn.text }],
            })
        })
        .collect();
    let context_text = prompt.context_block.clone().unwrap_or_default();

    json!({
        "question": prompt.question.clone().unwrap_or_default(),
        "k": HYBRID_K,
        "probes": HYBRID_PROBES,
        "web": {
            "google": true,
            "scholar": true,
            "scrape": false,
            "fetch_pdfs": false,
            "max_results": 3,
        },
        "thread_id": "hybrid",
        "system": prompt.system_instruction,
        "context": prompt.conversation_context(),
        "messages": messages,
        "additionalProp1": {
            "systemInstruction": prompt.system_instruction,
            "contextText": context_text,
            "messages": messages,
        },
    })
}

/// Call the hybrid backend and normalize its response.
///
/// Normalization by declared content type: textual streams are previewed
/// via buffer-then-splice and forwarded whole; JSON bodies are buffered and
/// reduced to `answer` / `text` / the re-serialized document; anything else
/// is buffered as plain text. A non-2xx response is terminal; the primary
/// backend is never tried as a fallback.
pub(super) async fn call_hybrid(
    client: &reqwest::Client,
    config: &GatewayConfig,
    endpoint: &str,
    prompt: &AssembledPrompt,
) -> Result<ChatReply, GatewayError> {
    let payload = build_payload(prompt);
    tracing::debug!(
        question = %payload["question"],
        context_len = prompt.conversation_context().len(),
        "posting to hybrid endpoint"
    );

    let mut request = client.post(endpoint).json(&payload);
    if let Some(key) = &config.hybrid_api_key {
        request = request.bearer_auth(key);
    }
    let response = request.send().await.map_err(GatewayError::upstream)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), %body, "hybrid endpoint returned an error");
        return Err(GatewayError::UpstreamCall {
            status: Some(status.as_u16()),
            message: body,
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.contains("text") {
        let source = response.bytes_stream().boxed();
        let (preview, spliced) = preview_stream(source, PREVIEW_CHAR_CAP).await;
        tracing::debug!(preview = %preview, "hybrid response preview");

        let body = spliced.map(|item| item.map_err(RelayError::from)).boxed();
        return Ok(ChatReply::stream(content_type, body));
    }

    if content_type.contains("application/json") {
        let document: Value = response.json().await.map_err(GatewayError::upstream)?;
        let answer = extract_answer(&document);
        return Ok(ChatReply::full(answer));
    }

    let text = response.text().await.map_err(GatewayError::upstream)?;
    Ok(ChatReply::full(text))
}

/// `answer` if present, else `text`, else the whole document re-serialized.
fn extract_answer(document: &Value) -> String {
    document
        .get("answer")
        .and_then(Value::as_str)
        .or_else(|| document.get("text").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| document.to_string())
}
