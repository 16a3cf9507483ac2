//! Domain model for a single question-forge run.
//!
//! A run starts from a [`SeedQuestion`], labels it ([`TaggedQuestion`]),
//! derives a batch of [`GeneratedQuestion`]s, solves each one ([`Solution`])
//! and grades the solutions ([`VerificationResult`]). All of it travels
//! through the stages inside a [`RunState`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Row identifier assigned by storage.
pub type RecordId = i64;

/// Question supplied by the caller, with a worked reasoning and answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedQuestion {
    pub question: String,
    pub thinking_chain: String,
    pub answer: String,
}

impl SeedQuestion {
    pub fn new(
        question: impl Into<String>,
        thinking_chain: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            thinking_chain: thinking_chain.into(),
            answer: answer.into(),
        }
    }

    /// Names of the fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("question", &self.question),
            ("thinking_chain", &self.thinking_chain),
            ("answer", &self.answer),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Seed question labelled with domain tags and a question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedQuestion {
    pub question: String,
    pub thinking_chain: String,
    pub answer: String,
    /// Ordered, de-duplicated, non-empty tags.
    pub domain_tags: Vec<String>,
    pub question_type: String,
}

impl TaggedQuestion {
    /// Labels a seed, normalizing the tag list.
    pub fn new<I, S>(seed: &SeedQuestion, domain_tags: I, question_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            question: seed.question.clone(),
            thinking_chain: seed.thinking_chain.clone(),
            answer: seed.answer.clone(),
            domain_tags: normalize_tags(domain_tags),
            question_type: question_type.into(),
        }
    }
}

/// Trims tags, drops empty ones and removes repeats while keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// One item of a generation response.
///
/// Models answer either with bare strings or with objects that carry their
/// own labels; both shapes decode into this enum.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CandidateQuestion {
    Plain(String),
    Tagged {
        question: String,
        #[serde(
            default,
            alias = "tags",
            alias = "domainTags",
            deserialize_with = "lenient_tags"
        )]
        domain_tags: Option<Vec<String>>,
        #[serde(default, alias = "questionType", deserialize_with = "lenient_label")]
        question_type: Option<String>,
    },
}

/// Reads a tag field that may be a list or a single comma-separated string.
///
/// Any other shape counts as omitted.
pub(crate) fn lenient_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s.split(',').map(str::to_string).collect()),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

/// Reads a text label; anything but a string counts as omitted.
pub(crate) fn lenient_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

impl CandidateQuestion {
    /// The question text.
    pub fn text(&self) -> &str {
        match self {
            CandidateQuestion::Plain(question) => question,
            CandidateQuestion::Tagged { question, .. } => question,
        }
    }

    /// Fills omitted labels from the parent question.
    ///
    /// An empty tag list or a blank type counts as omitted.
    pub fn resolve(self, parent: &TaggedQuestion) -> QuestionDraft {
        let (question, domain_tags, question_type) = match self {
            CandidateQuestion::Plain(question) => (question, None, None),
            CandidateQuestion::Tagged {
                question,
                domain_tags,
                question_type,
            } => (question, domain_tags, question_type),
        };

        let domain_tags = domain_tags
            .map(normalize_tags)
            .filter(|tags| !tags.is_empty())
            .unwrap_or_else(|| parent.domain_tags.clone());
        let question_type = question_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| parent.question_type.clone());

        QuestionDraft {
            question: question.trim().to_string(),
            domain_tags,
            question_type,
        }
    }
}

/// A candidate with all labels resolved, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub question: String,
    pub domain_tags: Vec<String>,
    pub question_type: String,
}

/// A persisted question derived from the seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub id: RecordId,
    pub parent_id: RecordId,
    pub question: String,
    pub domain_tags: Vec<String>,
    pub question_type: String,
}

impl GeneratedQuestion {
    pub fn from_draft(id: RecordId, parent_id: RecordId, draft: QuestionDraft) -> Self {
        Self {
            id,
            parent_id,
            question: draft.question,
            domain_tags: draft.domain_tags,
            question_type: draft.question_type,
        }
    }
}

/// A worked solution to one generated question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub id: RecordId,
    pub question_id: RecordId,
    /// Copy of the question text, kept for reporting.
    pub question: String,
    pub thinking_chain: String,
    pub answer: String,
    pub verification_score: Option<i64>,
    pub verification_passed: Option<bool>,
    pub verification_feedback: Option<String>,
}

impl Solution {
    /// Creates an unverified solution.
    pub fn new(
        id: RecordId,
        question: &GeneratedQuestion,
        thinking_chain: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            id,
            question_id: question.id,
            question: question.question.clone(),
            thinking_chain: thinking_chain.into(),
            answer: answer.into(),
            verification_score: None,
            verification_passed: None,
            verification_feedback: None,
        }
    }

    /// Replaces the content and clears any previous verdict.
    pub fn replace_content(&mut self, thinking_chain: String, answer: String) {
        self.thinking_chain = thinking_chain;
        self.answer = answer;
        self.verification_score = None;
        self.verification_passed = None;
        self.verification_feedback = None;
    }

    /// Records a verdict on the current content.
    pub fn apply_verification(&mut self, result: &VerificationResult) {
        self.verification_score = Some(result.score);
        self.verification_passed = Some(result.passed);
        self.verification_feedback = Some(result.feedback.clone());
    }
}

/// Grader verdict for one solution, reflecting the last attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub score: i64,
    pub passed: bool,
    pub feedback: String,
    pub suggestions: Vec<String>,
    /// Number of grading calls spent on this question.
    pub attempts: u32,
}

/// Position of a run in the pipeline.
///
/// `Start -> Tagged -> QuestionsGenerated -> Completed -> Verified`, with
/// `Failed` reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Tagged,
    QuestionsGenerated,
    Completed,
    Verified,
    Failed,
}

impl Stage {
    /// The stage reached on success, or `None` for terminal stages.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Start => Some(Stage::Tagged),
            Stage::Tagged => Some(Stage::QuestionsGenerated),
            Stage::QuestionsGenerated => Some(Stage::Completed),
            Stage::Completed => Some(Stage::Verified),
            Stage::Verified | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Verified | Stage::Failed)
    }

    /// Whether a run may move from `self` to `to`.
    pub fn can_transition_to(self, to: Stage) -> bool {
        match to {
            Stage::Failed => !self.is_terminal(),
            _ => self.next() == Some(to),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Tagged => "tagged",
            Stage::QuestionsGenerated => "questions_generated",
            Stage::Completed => "completed",
            Stage::Verified => "verified",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Working state of one run, passed by value from stage to stage.
///
/// `generated[i]`, `solutions[i]` and `verifications[i]` describe the same
/// question once each list is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub seed: SeedQuestion,
    pub tagged: Option<TaggedQuestion>,
    /// Storage id of the seed once the generation stage has persisted it.
    pub seed_id: Option<RecordId>,
    pub generated: Vec<GeneratedQuestion>,
    pub solutions: Vec<Solution>,
    pub verifications: Vec<VerificationResult>,
    pub current_stage: Stage,
    pub error: Option<String>,
}

impl RunState {
    pub fn new(seed: SeedQuestion) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            seed,
            tagged: None,
            seed_id: None,
            generated: Vec::new(),
            solutions: Vec::new(),
            verifications: Vec::new(),
            current_stage: Stage::Start,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Moves to `to`.
    ///
    /// If `to` is not a legal successor of the current stage the run is
    /// failed instead, so an agent driven out of order reports an error
    /// rather than skipping stages.
    pub fn advance_to(&mut self, to: Stage) {
        if self.current_stage.can_transition_to(to) {
            self.current_stage = to;
        } else {
            let message = format!("illegal stage transition {} -> {}", self.current_stage, to);
            self.fault(message);
        }
    }

    /// Records a stage failure as `"<stage> failed: <cause>"`.
    pub fn fail(&mut self, stage: &str, cause: impl fmt::Display) {
        self.error = Some(format!("{} failed: {}", stage, cause));
        self.current_stage = Stage::Failed;
    }

    /// Records a failure that happened outside any stage.
    pub fn fault(&mut self, message: impl fmt::Display) {
        self.error = Some(format!("pipeline fault: {}", message));
        self.current_stage = Stage::Failed;
    }
}
