//! Two-block system prompt for Anthropic prompt caching.
//!
//! The static block is identical across requests and flagged with
//! `cache_control: ephemeral`; the dynamic block carries per-request state
//! (local time, stats, whitelist names) and is placed last so it never breaks
//! the cached prefix.

#[derive(Debug, Clone, Default)]
pub struct SystemPrompt {
    pub static_block: String,
    pub dynamic_block: String,
}

impl SystemPrompt {
    pub fn new(static_block: impl Into<String>, dynamic_block: impl Into<String>) -> Self {
        Self {
            static_block: static_block.into(),
            dynamic_block: dynamic_block.into(),
        }
    }

    /// Flatten into one string for backends without caching.
    pub fn to_plain_text(&self) -> String {
        if self.dynamic_block.is_empty() {
            return self.static_block.clone();
        }
        format!("{}\n\n{}", self.static_block, self.dynamic_block)
    }

    /// Anthropic `system` parameter: content blocks with one cache breakpoint.
    pub fn to_anthropic_blocks(&self) -> Vec<serde_json::Value> {
        let mut blocks = vec![serde_json::json!({
            "type": "text",
            "text": self.static_block,
            "cache_control": { "type": "ephemeral" }
        })];
        if !self.dynamic_block.is_empty() {
            blocks.push(serde_json::json!({
                "type": "text",
                "text": self.dynamic_block,
            }));
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_block_carries_cache_control() {
        let prompt = SystemPrompt::new("role text", "dynamic text");
        let blocks = prompt.to_anthropic_blocks();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].get("cache_control").is_some());
        assert!(blocks[1].get("cache_control").is_none());
    }

    #[test]
    fn empty_dynamic_block_is_omitted() {
        let prompt = SystemPrompt::new("role text", "");
        assert_eq!(prompt.to_anthropic_blocks().len(), 1);
        assert_eq!(prompt.to_plain_text(), "role text");
    }

    #[test]
    fn plain_text_joins_blocks() {
        let prompt = SystemPrompt::new("a", "b");
        assert_eq!(prompt.to_plain_text(), "a\n\nb");
    }
}
