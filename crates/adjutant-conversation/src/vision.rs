//! Vision calls: owner photos in the control channel and the short
//! annotation used by ingest for caption-less photos.

use serde_json::json;

use adjutant_llm::{ChatRequest, LlmRouter, SystemPrompt};

/// Build a single-turn request whose user content starts with an image block.
pub fn image_request(
    model: &str,
    system: SystemPrompt,
    image_base64: &str,
    media_type: &str,
    question: &str,
) -> ChatRequest {
    let content = vec![
        json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": media_type,
                "data": image_base64,
            }
        }),
        json!({"type": "text", "text": question}),
    ];
    ChatRequest {
        model: model.to_string(),
        system: system.to_plain_text(),
        system_prompt: Some(system),
        messages: Vec::new(),
        max_tokens: 4096,
        tools: Vec::new(),
        raw_messages: Some(vec![json!({"role": "user", "content": content})]),
    }
}

/// Answer an owner photo with the assistant voice.
pub async fn answer_with_image(
    llm: &LlmRouter,
    system: SystemPrompt,
    image_base64: &str,
    media_type: &str,
    caption: &str,
) -> Result<String, adjutant_llm::ProviderError> {
    let question = if caption.is_empty() {
        "Что на изображении? Если это документ или скриншот — перескажи суть."
    } else {
        caption
    };
    let req = image_request(
        llm.assistant_model(),
        system,
        image_base64,
        media_type,
        question,
    );
    llm.send_api(&req).await.map(|resp| resp.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_block_comes_before_text() {
        let req = image_request(
            "claude-test",
            SystemPrompt::new("s", ""),
            "aGVsbG8=",
            "image/jpeg",
            "что это?",
        );
        let raw = req.raw_messages.unwrap();
        let content = raw[0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["type"], "text");
    }
}
