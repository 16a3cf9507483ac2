//! LLM prompts for the question pipeline.
//!
//! - [`experts`] - domain expert personas keyed by tag
//! - [`stages`] - system and user prompts for tagging, generation, solving
//!   and verification
//!
//! # Usage
//!
//! ```
//! use question_forge::prompts::{build_solve_prompt, SOLVING_SYSTEM_PROMPT};
//!
//! let tags = vec!["math".to_string()];
//! let prompt = build_solve_prompt(&tags, "computation", "What is 12 * 12?");
//! assert_eq!(prompt.system, SOLVING_SYSTEM_PROMPT);
//! assert!(prompt.user.contains("12 * 12"));
//! ```

pub mod experts;
pub mod stages;

pub use experts::{expert_description, expert_for_tag, known_tags, DOMAIN_EXPERTS, FALLBACK_EXPERT};
pub use stages::{
    build_generation_prompt, build_solve_prompt, build_tagging_prompt, build_verify_prompt,
    StagePrompt, GENERATION_SYSTEM_PROMPT, SOLVING_SYSTEM_PROMPT, TAGGING_SYSTEM_PROMPT,
    VERIFICATION_SYSTEM_PROMPT,
};
