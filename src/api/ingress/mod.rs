pub mod anthropic;
pub mod openai_chat;
