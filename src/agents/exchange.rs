//! Request/response plumbing shared by the stage agents.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::error::{AgentError, AgentResult};
use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::prompts::StagePrompt;
use crate::utils::response_parser::{parse_response, Record};

/// Sends a stage prompt and parses the reply into a JSON record.
pub(crate) async fn request_record(
    llm: &dyn LlmProvider,
    stage: &str,
    prompt: StagePrompt,
    temperature: Option<f64>,
) -> AgentResult<Record> {
    let mut request = GenerationRequest::new(
        "",
        vec![Message::system(prompt.system), Message::user(prompt.user)],
    );
    if let Some(temperature) = temperature {
        request = request.with_temperature(temperature);
    }

    let response = llm.generate(request).await?;
    let content = response
        .first_content()
        .ok_or_else(|| LlmError::EmptyResponse("response contained no choices".to_string()))?;

    debug!(stage, chars = content.len(), "Model responded");
    Ok(parse_response(content)?)
}

/// Deserializes a parsed record into a typed stage response.
pub(crate) fn decode_record<T: DeserializeOwned>(record: Record) -> AgentResult<T> {
    serde_json::from_value(Value::Object(record))
        .map_err(|e| AgentError::InvalidResponse(e.to_string()))
}

/// Accepts any JSON scalar as text: `null` becomes empty, numbers and
/// booleans are rendered.
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}
