pub mod form_fill;
pub mod research;
pub mod suggestion;
pub mod tool_calling;
pub mod writer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::form_fill::{
        FILL_CONFIRMATION, FormFillConfig, FormFillEvent, FormFillState, form_fill_workflow,
    };
    pub use crate::research::{
        Finding, PlanDecision, ResearchConfig, ResearchEvent, ResearchPlan, ResearchState,
        research_workflow,
    };
    pub use crate::suggestion::suggest_next_questions;
    pub use crate::tool_calling::{
        ToolCallAccumulator, ToolCallResponse, call_tools, chat_with_tools, record_tool_turn,
        single_tool_violation, stream_text,
    };
    pub use crate::writer::{ReviewDecision, WriterConfig, WriterEvent, WriterState, writer_workflow};
}
