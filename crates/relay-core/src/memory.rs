use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// Ordered conversation history owned by a single run.
///
/// Mutated only through [`Memory::put`] (append) and [`Memory::set`]
/// (replace the whole history, used once when a run starts).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    messages: Vec<Message>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append a message.
    pub fn put(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages, preserving their order.
    pub fn put_all(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Replace the whole history.
    pub fn set(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    /// History with `system` prepended, unless the history already starts
    /// with a system message.
    pub fn with_system_prompt(&self, system: &str) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if !matches!(self.messages.first(), Some(Message::System { .. })) {
            out.push(Message::system(system));
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role() == role).count()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
