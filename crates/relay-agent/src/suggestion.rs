use std::sync::Arc;

use futures::FutureExt;
use schemars::JsonSchema;
use serde::Deserialize;

use relay_core::message::Message;
use relay_core::model::ChatModel;
use relay_core::structured::generate_structured;
use relay_graph::event::CompletionHook;
use relay_graph::notification::Notification;

const MAX_QUESTIONS: usize = 3;

const PROMPT: &str = "You are helping a user explore a topic. Given the conversation and the \
latest answer, propose up to 3 short follow-up questions the user might ask next. \
Reply with JSON only: {\"questions\": [\"...\"]}.";

#[derive(Debug, Deserialize, JsonSchema)]
struct FollowUps {
    questions: Vec<String>,
}

/// Completion hook that asks `llm` for follow-up questions once the final
/// answer is known.
///
/// Failures are logged and produce no notification.
pub fn suggest_next_questions(llm: Arc<dyn ChatModel>, history: Vec<Message>) -> CompletionHook {
    Box::new(move |answer: String| {
        async move {
            let mut messages = Vec::with_capacity(history.len() + 2);
            messages.push(Message::system(PROMPT));
            messages.extend(history);
            messages.push(Message::assistant(answer));

            match generate_structured::<FollowUps>(llm.as_ref(), &messages, "follow_up_questions").await {
                Ok(FollowUps { mut questions }) => {
                    questions.retain(|q| !q.trim().is_empty());
                    questions.truncate(MAX_QUESTIONS);
                    if questions.is_empty() {
                        Vec::new()
                    } else {
                        vec![Notification::SuggestedQuestions { questions }]
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not generate follow-up questions");
                    Vec::new()
                }
            }
        }
        .boxed()
    })
}
