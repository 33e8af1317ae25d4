pub const DEFAULT_CHARACTER_LABEL: &str = "the character";

const DEFAULT_FLAVOR_PROMPTS: &[&str] = &[
    "*stands silently, looking deep in thought*",
    "*pauses, eyes wandering over the surroundings*",
    "*hesitates, appearing lost for a moment*",
    "*takes a deep breath, collecting their thoughts*",
    "*gazes into the distance, seemingly distracted*",
    "*remains still, absorbing the ambiance*",
    "*lingers in silence, a contemplative look on their face*",
    "*stops, fingers brushing against an old memory*",
    "*seems to drift into a momentary daydream*",
    "*waits quietly, allowing the weight of the moment to settle*",
];

pub fn default_flavor_prompts() -> Vec<String> {
    DEFAULT_FLAVOR_PROMPTS
        .iter()
        .map(|line| (*line).to_string())
        .collect()
}

/// Instruction asking the character for a short first-person selfie moment.
///
/// Deterministic: the only variable parts are the character name and the
/// optional flavor line picked by the caller.
pub fn build_instruction(character: Option<&str>, flavor: Option<&str>) -> String {
    let name = character
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CHARACTER_LABEL);

    let mut lines = vec![
        format!("You are roleplaying as {name} in the current scene."),
        String::new(),
        "The user has been idle for a while.".to_string(),
        "Your next message should be a short, first-person, in-world \"selfie\" style message."
            .to_string(),
        String::new(),
        "Strict rules:".to_string(),
        format!("- Write from {name}'s first-person perspective (\"I\")."),
        "- ONE single paragraph only.".to_string(),
        "- 1–3 sentences total.".to_string(),
        "- Maximum ~60 words.".to_string(),
        "- Do NOT repeat the same sentence or description.".to_string(),
        "- Describe a selfie or a moment right after taking a selfie.".to_string(),
        "- Include pose, facial expression, outfit, setting, and overall vibe/mood.".to_string(),
        "- Stay fully in character and in-world.".to_string(),
        "- Do NOT mention cameras, prompts, AI, or that you were instructed to do this."
            .to_string(),
    ];
    if let Some(flavor) = flavor.map(str::trim).filter(|value| !value.is_empty()) {
        lines.push(format!("- Use this extra flavor as inspiration: {flavor}"));
    }
    lines.join("\n")
}

/// Replaces the `{{char}}` and `{{user}}` macros, case-insensitively.
pub fn substitute_macros(text: &str, character: Option<&str>, user: Option<&str>) -> String {
    let character = character.unwrap_or(DEFAULT_CHARACTER_LABEL);
    let user = user.unwrap_or("User");
    replace_ignore_case(&replace_ignore_case(text, "{{char}}", character), "{{user}}", user)
}

fn replace_ignore_case(haystack: &str, needle: &str, replacement: &str) -> String {
    let lowered = haystack.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut cursor = 0;
    while let Some(found) = lowered[cursor..].find(needle) {
        let start = cursor + found;
        out.push_str(&haystack[cursor..start]);
        out.push_str(replacement);
        cursor = start + needle.len();
    }
    out.push_str(&haystack[cursor..]);
    out
}
