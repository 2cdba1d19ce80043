use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::error::{ModelError, Result};
use crate::message::Message;
use crate::model::{CallOptions, ChatModel, ResponseFormat};

/// Build a strict JSON-schema response format for `T`.
pub fn response_format_for<T: JsonSchema>(name: &str) -> Result<ResponseFormat> {
    let schema = schemars::schema_for!(T);
    Ok(ResponseFormat::JsonSchema {
        name: name.to_string(),
        schema: serde_json::to_value(schema)?,
        strict: true,
    })
}

/// Parse a model reply that must be a JSON document matching `T`.
///
/// No repair is attempted: anything that does not deserialize is a
/// [`ModelError::MalformedOutput`].
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T> {
    serde_json::from_str(content.trim()).map_err(|e| {
        tracing::warn!(error = %e, "model reply did not match the expected schema");
        ModelError::MalformedOutput(format!("{e}; reply was: {}", preview(content))).into()
    })
}

/// Ask `llm` for a structured decision of type `T`.
pub async fn generate_structured<T>(llm: &dyn ChatModel, messages: &[Message], name: &str) -> Result<T>
where
    T: JsonSchema + DeserializeOwned,
{
    let options = CallOptions {
        response_format: Some(response_format_for::<T>(name)?),
        ..Default::default()
    };
    let result = llm.generate(messages, &options).await?;
    parse_structured(result.message.content())
}

fn preview(content: &str) -> String {
    const MAX: usize = 120;
    match content.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}
