pub mod config;
pub mod error;
pub mod memory;
pub mod message;
pub mod mock;
pub mod model;
pub mod retriever;
pub mod structured;
pub mod tool;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::RunConfig;
    pub use crate::error::{GraphError, ModelError, RelayError, Result, ResumeError, ToolError};
    pub use crate::memory::Memory;
    pub use crate::message::{Message, Role, ToolCall};
    pub use crate::model::{
        CallOptions, ChatEventStream, ChatModel, ChatResult, ChatStreamEvent, ResponseFormat,
        TextChunkStream,
    };
    pub use crate::retriever::{RetrievedNode, Retriever};
    pub use crate::structured::{generate_structured, parse_structured};
    pub use crate::tool::{Tool, ToolDefinition, ToolOutcome, ToolResult};
}
