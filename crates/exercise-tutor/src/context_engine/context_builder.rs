//! Turns (user, assistant) history pairs into a role-tagged transcript

use crate::message::{Message, MessagePair};
use tracing::debug;

pub struct ContextBuilder;

impl ContextBuilder {
    /// Flatten `pairs` in order.
    ///
    /// Each pair contributes a user message when its first slot is set, then
    /// an assistant message when its second slot is set. Empty slots emit
    /// nothing.
    pub fn build(pairs: &[MessagePair]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(pairs.len() * 2);
        for (user, assistant) in pairs {
            if let Some(text) = user {
                messages.push(Message::user(text.as_str()));
            }
            if let Some(text) = assistant {
                messages.push(Message::assistant(text.as_str()));
            }
        }
        debug!("Built context with {} messages from {} pairs", messages.len(), pairs.len());
        messages
    }
}
