//! Tools whose result is their own argument

use serde::Deserialize;

/// `explain_plan` arguments
#[derive(Debug, Clone, Deserialize)]
pub struct PlanArgs {
    pub plan: String,
}

/// `answer_question` arguments
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerArgs {
    pub query: String,
}
