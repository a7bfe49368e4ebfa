// Clarification - multiple-choice questions that pin down what a vague query means

use super::dispatcher::{AgentError, Dispatcher};
use super::types::AgentConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::ops::RangeInclusive;

pub const QUESTION_COUNT: RangeInclusive<usize> = 2..=3;
pub const CHOICE_COUNT: RangeInclusive<usize> = 3..=4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultipleChoiceQuestion {
    pub question: String,
    pub choices: Vec<String>,
}

/// Questions an agent asks back before answering an ambiguous query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClarificationSet {
    pub questions: Vec<MultipleChoiceQuestion>,
}

impl ClarificationSet {
    /// JSON schema passed to the model as the response format
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "minItems": QUESTION_COUNT.start(),
                    "maxItems": QUESTION_COUNT.end(),
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": {"type": "string"},
                            "choices": {
                                "type": "array",
                                "minItems": CHOICE_COUNT.start(),
                                "maxItems": CHOICE_COUNT.end(),
                                "items": {"type": "string"}
                            }
                        },
                        "required": ["question", "choices"]
                    }
                }
            },
            "required": ["questions"]
        })
    }

    /// Models do not always honor `minItems`/`maxItems`, so counts are checked here
    pub fn validate(&self) -> Result<(), String> {
        if !QUESTION_COUNT.contains(&self.questions.len()) {
            return Err(format!(
                "expected {}-{} questions, got {}",
                QUESTION_COUNT.start(),
                QUESTION_COUNT.end(),
                self.questions.len()
            ));
        }
        for (i, q) in self.questions.iter().enumerate() {
            if q.question.trim().is_empty() {
                return Err(format!("question {} is empty", i + 1));
            }
            if !CHOICE_COUNT.contains(&q.choices.len()) {
                return Err(format!(
                    "question {} has {} choices, expected {}-{}",
                    i + 1,
                    q.choices.len(),
                    CHOICE_COUNT.start(),
                    CHOICE_COUNT.end()
                ));
            }
        }
        Ok(())
    }

    /// Numbered questions with lettered choices, as markdown
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, q) in self.questions.iter().enumerate() {
            out.push_str(&format!("{}. **{}**\n", i + 1, q.question));
            for (letter, choice) in ('a'..='z').zip(&q.choices) {
                out.push_str(&format!("   {letter}) {choice}\n"));
            }
        }
        out
    }
}

/// The clarification agent used when none is configured
pub fn clarifier_agent() -> AgentConfig {
    let mut agent = AgentConfig::new("Multi-Choice Clarification Engine", "qwen2.5:3b")
        .with_description("Generates multiple clarifying questions with answer choices to pinpoint user intent")
        .with_instruction("Identify 2-3 key aspects of the query that need clarification")
        .with_instruction("For each aspect, create a focused multiple-choice question")
        .with_instruction("Provide 3-4 relevant answer choices per question covering common possibilities")
        .with_instruction("Ensure questions are specific and mutually exclusive in their options")
        .with_instruction("Maintain neutral phrasing without assuming prior knowledge")
        .with_schema(ClarificationSet::schema());
    agent.markdown = false;
    agent
}

/// Ask `agent` for clarifying questions about `query`.
///
/// The agent's schema defaults to [`ClarificationSet::schema`] when unset.
pub async fn clarify(
    dispatcher: &dyn Dispatcher,
    agent: &AgentConfig,
    query: &str,
) -> Result<ClarificationSet, AgentError> {
    let mut agent = agent.clone();
    agent.schema.get_or_insert_with(ClarificationSet::schema);

    let malformed = |reason: String| AgentError::MalformedOutput {
        agent: agent.name.clone(),
        reason,
    };

    let response = dispatcher.dispatch(&agent, query).await?;
    let structured = response
        .structured
        .ok_or_else(|| malformed("no structured output".to_string()))?;
    let set: ClarificationSet =
        serde_json::from_value(structured).map_err(|e| malformed(format!("not a question set: {e}")))?;
    set.validate().map_err(malformed)?;

    tracing::debug!(agent = %agent.name, questions = set.questions.len(), "clarification ready");
    Ok(set)
}
