//! Domain expert personas keyed by domain tag.

/// Persona used when no tag has a dedicated expert.
pub const FALLBACK_EXPERT: &str = "education expert";

/// Known domain tags and the persona that writes and solves questions for them.
pub const DOMAIN_EXPERTS: &[(&str, &str)] = &[
    ("math", "mathematics education expert"),
    ("physics", "physics expert"),
    ("chemistry", "chemistry expert"),
    ("biology", "biology expert"),
    ("history", "history expert"),
    ("geography", "geography expert"),
    ("literature", "language and literature teaching expert"),
    ("english", "English teaching expert"),
    ("programming", "computer programming expert"),
    ("algorithms", "algorithms and data structures expert"),
    ("machine learning", "machine learning expert"),
    ("deep learning", "deep learning expert"),
    ("economics", "economics expert"),
    ("psychology", "psychology expert"),
    ("philosophy", "philosophy expert"),
    ("logic", "logic expert"),
];

/// Looks up the persona for a single tag, ignoring case and surrounding whitespace.
pub fn expert_for_tag(tag: &str) -> Option<&'static str> {
    let tag = tag.trim();
    DOMAIN_EXPERTS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(tag))
        .map(|(_, expert)| *expert)
}

/// Joins the personas for all known tags, in tag order and without repeats.
///
/// Returns [`FALLBACK_EXPERT`] when none of the tags is known.
pub fn expert_description(tags: &[String]) -> String {
    let mut experts: Vec<&str> = Vec::new();
    for expert in tags.iter().filter_map(|tag| expert_for_tag(tag)) {
        if !experts.contains(&expert) {
            experts.push(expert);
        }
    }

    if experts.is_empty() {
        FALLBACK_EXPERT.to_string()
    } else {
        experts.join(", ")
    }
}

/// Comma-separated list of the tags the tagging stage may choose from.
pub fn known_tags() -> String {
    DOMAIN_EXPERTS
        .iter()
        .map(|(key, _)| *key)
        .collect::<Vec<_>>()
        .join(", ")
}
