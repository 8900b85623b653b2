//! Cleanup of answer text returned by the service.
//!
//! Invisible characters are stripped. Text that looks like an attempt to steer
//! a downstream model is flagged but left in place so the caller decides.

use regex::Regex;
use std::sync::LazyLock;

/// Known injection signatures with a short label for warnings.
const INJECTION_PATTERNS: &[(&str, &str)] = &[
    (
        "instruction-override",
        r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+instructions",
    ),
    (
        "instruction-override",
        r"(?i)(disregard|forget)\s+(all\s+)?(previous|prior|above)",
    ),
    ("role-reassignment", r"(?i)you\s+are\s+now\s+(a|an)\b"),
    ("system-prompt", r"(?i)new\s+system\s+prompt"),
    ("role-marker", r"(?m)^\s*(SYSTEM|ASSISTANT|USER)\s*:"),
    ("chat-template", r"\[INST\]"),
    ("chat-template", r"<<SYS>>"),
    ("chat-template", r"<\|im_start\|>"),
    ("role-playing", r"(?i)\bact\s+as\s+(a|an|if)\b"),
    ("role-playing", r"(?i)\bpretend\s+(you'?re|you\s+are)\b"),
    ("role-marker", r"(?i)role\s*:\s*system"),
];

static INJECTION_REGEXES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    INJECTION_PATTERNS
        .iter()
        .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (*label, re)))
        .collect()
});

static EXCESS_NEWLINES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\n{4,}").ok());

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'
            | '\u{FEFF}'
            | '\u{00AD}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
    )
}

/// Cleaned text plus human-readable findings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sanitized {
    pub clean: String,
    pub warnings: Vec<String>,
}

pub fn sanitize(text: &str) -> Sanitized {
    if text.is_empty() {
        return Sanitized::default();
    }

    let mut warnings = Vec::new();

    let removed = text.chars().filter(|c| is_invisible(*c)).count();
    let mut clean: String = if removed > 0 {
        warnings.push(format!("Removed {removed} invisible character(s)"));
        text.chars().filter(|c| !is_invisible(*c)).collect()
    } else {
        text.to_string()
    };

    for (index, (label, re)) in INJECTION_REGEXES.iter().enumerate() {
        if re.is_match(&clean) {
            warnings.push(format!(
                "Possible prompt injection ({label}, pattern #{})",
                index + 1
            ));
        }
    }

    if let Some(re) = EXCESS_NEWLINES.as_ref() {
        clean = re.replace_all(&clean, "\n\n\n").into_owned();
    }

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Response sanitizer findings");
    }

    Sanitized { clean, warnings }
}
