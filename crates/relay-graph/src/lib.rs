pub mod bridge;
pub mod builder;
pub mod context;
mod dispatch;
pub mod event;
pub mod handler;
pub mod notification;
mod resume;
pub mod step;
pub mod workflow;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bridge::{SideChannel, SideEvent, bridge};
    pub use crate::builder::WorkflowBuilder;
    pub use crate::context::{ContextState, RunContext, WorkflowState};
    pub use crate::event::{
        CompletionHook, PAUSE, PauseRequest, STOP, StepOutput, StopPayload, StopSignal, WorkflowEvent,
    };
    pub use crate::handler::{PausedRun, RunEvent, RunOutcome, WorkflowHandler};
    pub use crate::notification::{Notification, Progress};
    pub use crate::step::{StepFn, unexpected_event};
    pub use crate::workflow::{HumanResponder, RunOptions, Workflow};
}
