//! Prompt builders for the four pipeline stages.
//!
//! Each builder returns a [`StagePrompt`] pairing the stage's fixed system
//! prompt with a user prompt rendered from the question at hand. Every
//! prompt asks for a single JSON object and nothing else; the response
//! parser copes with the cases where the model ignores that.

use super::experts::{expert_description, known_tags};

/// System and user prompt for one model call.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePrompt {
    /// System prompt establishing the model's role for the stage.
    pub system: String,
    /// User prompt carrying the question material.
    pub user: String,
}

impl StagePrompt {
    /// Creates a new stage prompt with the given system and user messages.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// System prompt for the tagging stage.
pub const TAGGING_SYSTEM_PROMPT: &str = "You are a curriculum analyst. You classify exam and \
exercise questions by subject domain and question type. You always answer with a single JSON \
object and no other text.";

/// System prompt for the generation stage.
pub const GENERATION_SYSTEM_PROMPT: &str = "You are an experienced question author. You write \
new exercise questions that test the same knowledge as a reference question in a different \
setting. You always answer with a single JSON object and no other text.";

/// System prompt for the solving stage.
pub const SOLVING_SYSTEM_PROMPT: &str = "You are a patient subject tutor. You solve questions \
step by step and show every inference. You always answer with a single JSON object and no other \
text.";

/// System prompt for the verification stage.
pub const VERIFICATION_SYSTEM_PROMPT: &str = "You are a strict grader. You check worked \
solutions for correctness, completeness and clarity and score them from 0 to 100. You always \
answer with a single JSON object and no other text.";

/// Builds the prompt that assigns domain tags and a question type to a seed question.
pub fn build_tagging_prompt(question: &str, thinking_chain: &str, answer: &str) -> StagePrompt {
    let user = format!(
        r#"Analyze the following question and label it with the subject domains it covers and its question type.

Question: {question}

Thinking chain: {thinking_chain}

Answer: {answer}

Choose one or more domain tags, preferring this list: {tags}.
Choose one question type, for example "computation", "proof", "short-answer", "multiple-choice" or "essay".

Respond with JSON only, for example:
{{"tags": ["math", "logic"], "question_type": "computation"}}"#,
        tags = known_tags(),
    );

    StagePrompt::new(TAGGING_SYSTEM_PROMPT, user)
}

/// Builds the prompt that asks for `count` questions similar to the seed.
pub fn build_generation_prompt(
    domain_tags: &[String],
    question_type: &str,
    question: &str,
    thinking_chain: &str,
    answer: &str,
    count: usize,
) -> StagePrompt {
    let expert = expert_description(domain_tags);
    let tags = domain_tags.join(", ");
    let tags_json = serde_json::to_string(domain_tags).unwrap_or_else(|_| "[]".to_string());
    let type_json = serde_json::to_string(question_type).unwrap_or_else(|_| "\"\"".to_string());

    let user = format!(
        r#"Your role: {expert}, writing questions in the domains: {tags}.

Original question: {question}

Original thinking chain: {thinking_chain}

Original answer: {answer}

Original labels:
- domain tags: {tags}
- question type: {question_type}

Write {count} new questions that test the same knowledge and keep the same question type ({question_type}). Requirements:
1. Keep the same knowledge points and solution approach.
2. Keep the question type {question_type}.
3. Change the concrete scenario, numbers or background.
4. Every question must have a clear, checkable answer.
5. If the original has no scenario, add a plausible one.
6. Spread the questions across basic, intermediate and advanced difficulty, at least one fifth at each level.
7. Phrase every question precisely. Avoid vague or overly broad wording, yes/no questions, misleading assumptions and near-duplicates.

Respond with JSON only, for example:
{{
    "questions": [
        {{"question": "first question", "domain_tags": {tags_json}, "question_type": {type_json}}},
        {{"question": "second question", "domain_tags": {tags_json}, "question_type": {type_json}}}
    ]
}}"#,
    );

    StagePrompt::new(GENERATION_SYSTEM_PROMPT, user)
}

/// Builds the prompt that solves one generated question.
pub fn build_solve_prompt(domain_tags: &[String], question_type: &str, question: &str) -> StagePrompt {
    let expert = expert_description(domain_tags);

    let user = format!(
        r#"Your role: {expert}. Solve the following {question_type} question in detail.

Question: {question}

Provide:
1. A detailed thinking chain that analyses the problem step by step.
2. The final answer.

The thinking chain must be clear and complete, justify every step, explain key concepts and methods where needed, and read as one coherent argument.

Respond with JSON only, for example:
{{
    "thinking_chain": "step-by-step reasoning...",
    "answer": "final answer"
}}"#,
    );

    StagePrompt::new(SOLVING_SYSTEM_PROMPT, user)
}

/// Builds the prompt that grades a solution against its question.
pub fn build_verify_prompt(
    domain_tags: &[String],
    question_type: &str,
    question: &str,
    thinking_chain: &str,
    answer: &str,
) -> StagePrompt {
    let expert = expert_description(domain_tags);

    let user = format!(
        r#"Your role: {expert}, reviewing a worked solution to a {question_type} question.

Question: {question}

Thinking chain: {thinking_chain}

Answer: {answer}

Check whether the reasoning is correct and complete and whether the final answer is right.
Give an integer score from 0 to 100. A solution passes only if the final answer is correct and the reasoning has no substantive errors.

Respond with JSON only, for example:
{{
    "score": 85,
    "passed": true,
    "feedback": "what is right or wrong with the solution",
    "suggestions": ["concrete improvement", "another improvement"]
}}"#,
    );

    StagePrompt::new(VERIFICATION_SYSTEM_PROMPT, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Vec<String> {
        vec!["math".to_string(), "algebra".to_string()]
    }

    #[test]
    fn test_tagging_prompt_contains_material() {
        let prompt = build_tagging_prompt("What is 2 + 2?", "Add the numbers.", "4");
        assert_eq!(prompt.system, TAGGING_SYSTEM_PROMPT);
        assert!(prompt.user.contains("What is 2 + 2?"));
        assert!(prompt.user.contains("Add the numbers."));
        assert!(prompt.user.contains("\"question_type\""));
        assert!(prompt.user.contains("machine learning"));
    }

    #[test]
    fn test_generation_prompt_contains_labels_and_count() {
        let prompt = build_generation_prompt(&tags(), "computation", "Q", "T", "A", 5);
        assert_eq!(prompt.system, GENERATION_SYSTEM_PROMPT);
        assert!(prompt.user.contains("mathematics education expert"));
        assert!(prompt.user.contains("domain tags: math, algebra"));
        assert!(prompt.user.contains("Write 5 new questions"));
        assert!(prompt.user.contains(r#""domain_tags": ["math","algebra"]"#));
        assert!(prompt.user.contains(r#""question_type": "computation""#));
    }

    #[test]
    fn test_solve_prompt_uses_fallback_expert() {
        let prompt = build_solve_prompt(&["cooking".to_string()], "short-answer", "How long?");
        assert_eq!(prompt.system, SOLVING_SYSTEM_PROMPT);
        assert!(prompt.user.contains("Your role: education expert."));
        assert!(prompt.user.contains("How long?"));
        assert!(prompt.user.contains("\"thinking_chain\""));
    }

    #[test]
    fn test_verify_prompt_contains_solution() {
        let prompt = build_verify_prompt(&tags(), "proof", "Prove it", "Because.", "QED");
        assert_eq!(prompt.system, VERIFICATION_SYSTEM_PROMPT);
        assert!(prompt.user.contains("Prove it"));
        assert!(prompt.user.contains("Because."));
        assert!(prompt.user.contains("QED"));
        assert!(prompt.user.contains("\"suggestions\""));
    }

    #[test]
    fn test_system_prompts_are_distinct() {
        let prompts = [
            TAGGING_SYSTEM_PROMPT,
            GENERATION_SYSTEM_PROMPT,
            SOLVING_SYSTEM_PROMPT,
            VERIFICATION_SYSTEM_PROMPT,
        ];
        for (i, a) in prompts.iter().enumerate() {
            for b in &prompts[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
