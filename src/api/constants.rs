//! Call identifiers and option codes used by the web application.

use crate::error::{NotebookError, Result};

/// batchexecute call ids.
pub mod rpc_ids {
    pub const NOTEBOOK_LIST: &str = "wXbhsf";
    pub const NOTEBOOK_CREATE: &str = "CCqFvf";
    pub const NOTEBOOK_GET: &str = "rLM1Ne";
    /// Rename and chat configuration.
    pub const NOTEBOOK_UPDATE: &str = "s0tc2d";
    pub const NOTEBOOK_DELETE: &str = "WWINqb";
    pub const NOTEBOOK_DESCRIBE: &str = "VfAZjd";

    pub const SOURCE_ADD: &str = "izAoDd";
    pub const SOURCE_GET_CONTENT: &str = "hizoJc";
    pub const SOURCE_LIST_DRIVE: &str = "yR9Yof";
    pub const SOURCE_SYNC_DRIVE: &str = "FLmJqe";
    pub const SOURCE_DELETE: &str = "tGMBJ";
    pub const SOURCE_DESCRIBE: &str = "tr032e";

    pub const RESEARCH_START_FAST: &str = "Ljjv0c";
    pub const RESEARCH_START_DEEP: &str = "QA9ei";
    pub const RESEARCH_STATUS: &str = "e3bVqc";
    pub const RESEARCH_IMPORT: &str = "LBwxtb";

    pub const STUDIO_CREATE: &str = "R7cb6c";
    pub const STUDIO_STATUS: &str = "gArtLc";
    pub const STUDIO_DELETE: &str = "V5N4be";
}

type CodeTable = &'static [(&'static str, u32)];

const STUDIO_TYPES: CodeTable = &[
    ("audio", 1),
    ("report", 2),
    ("briefing_doc", 2),
    ("video", 3),
    // quizzes share this code
    ("flashcards", 4),
    ("infographic", 7),
    ("slide_deck", 8),
    ("data_table", 9),
];

const AUDIO_FORMATS: CodeTable = &[
    ("deep_dive", 1),
    ("brief", 2),
    ("critique", 3),
    ("debate", 4),
    ("conversation", 1),
    ("single_host", 2),
];

const AUDIO_LENGTHS: CodeTable = &[("short", 1), ("medium", 2), ("long", 3)];

const VIDEO_STYLES: CodeTable = &[
    ("auto_select", 1),
    ("auto", 1),
    ("custom", 2),
    ("classic", 3),
    ("whiteboard", 4),
    ("kawaii", 5),
    ("anime", 6),
    ("watercolor", 7),
    ("retro_print", 8),
    ("retro", 8),
    ("heritage", 9),
    ("paper_craft", 10),
];

const REPORT_FORMATS: CodeTable = &[
    ("briefing_doc", 2),
    ("study_guide", 3),
    ("faq", 4),
    ("timeline", 5),
    ("blog_post", 19),
];

const DIFFICULTY_LEVELS: CodeTable = &[("easy", 1), ("medium", 2), ("hard", 3)];

const INFOGRAPHIC_ORIENTATIONS: CodeTable = &[("landscape", 1), ("portrait", 2), ("square", 3)];

const DETAIL_LEVELS: CodeTable = &[("brief", 1), ("standard", 2), ("detailed", 3)];

const SLIDE_DECK_FORMATS: CodeTable = &[
    ("detailed_deck", 1),
    ("presenter_slides", 2),
    ("standard", 1),
    ("detailed", 1),
    ("presenter", 2),
];

const SLIDE_DECK_LENGTHS: CodeTable = &[("short", 1), ("default", 3), ("medium", 3), ("long", 3)];

const CHAT_GOALS: CodeTable = &[
    ("default", 1),
    ("custom", 2),
    ("learning_guide", 3),
    ("learn", 3),
    ("create", 2),
    ("analyze", 3),
];

const RESPONSE_LENGTHS: CodeTable = &[
    ("default", 1),
    ("longer", 4),
    ("shorter", 5),
    ("short", 5),
    ("medium", 1),
    ("long", 4),
];

fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c })
        .collect()
}

fn resolve(table: CodeTable, name: &str, label: &str) -> Result<u32> {
    let key = normalize_name(name);
    table
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, code)| *code)
        .ok_or_else(|| {
            let valid: Vec<&str> = table.iter().map(|(alias, _)| *alias).collect();
            NotebookError::validation(format!(
                "Unknown {label}: {name}. Valid: {}",
                valid.join(", ")
            ))
        })
}

/// Human-readable option names to wire codes.
pub struct CodeMapper;

impl CodeMapper {
    pub fn studio_type(name: &str) -> Result<u32> {
        resolve(STUDIO_TYPES, name, "studio type")
    }

    pub fn audio_format(name: &str) -> Result<u32> {
        resolve(AUDIO_FORMATS, name, "audio format")
    }

    pub fn audio_length(name: &str) -> Result<u32> {
        resolve(AUDIO_LENGTHS, name, "audio length")
    }

    pub fn video_style(name: &str) -> Result<u32> {
        resolve(VIDEO_STYLES, name, "video style")
    }

    pub fn report_format(name: &str) -> Result<u32> {
        resolve(REPORT_FORMATS, name, "report format")
    }

    pub fn difficulty(name: &str) -> Result<u32> {
        resolve(DIFFICULTY_LEVELS, name, "difficulty")
    }

    pub fn infographic_orientation(name: &str) -> Result<u32> {
        resolve(INFOGRAPHIC_ORIENTATIONS, name, "orientation")
    }

    pub fn detail_level(name: &str) -> Result<u32> {
        resolve(DETAIL_LEVELS, name, "detail level")
    }

    pub fn slide_deck_format(name: &str) -> Result<u32> {
        resolve(SLIDE_DECK_FORMATS, name, "slide deck format")
    }

    pub fn slide_deck_length(name: &str) -> Result<u32> {
        resolve(SLIDE_DECK_LENGTHS, name, "slide deck length")
    }

    /// `None` selects the default goal.
    pub fn chat_goal(name: Option<&str>) -> Result<u32> {
        name.map_or(Ok(1), |n| resolve(CHAT_GOALS, n, "chat goal"))
    }

    pub fn response_length(name: &str) -> Result<u32> {
        resolve(RESPONSE_LENGTHS, name, "response length")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_and_separator_insensitive() {
        assert_eq!(CodeMapper::studio_type("Slide Deck").unwrap(), 8);
        assert_eq!(CodeMapper::studio_type("DATA-TABLE").unwrap(), 9);
        assert_eq!(CodeMapper::report_format("blog post").unwrap(), 19);
        assert_eq!(CodeMapper::video_style("Paper-Craft").unwrap(), 10);
    }

    #[test]
    fn legacy_aliases_resolve() {
        assert_eq!(CodeMapper::audio_format("conversation").unwrap(), 1);
        assert_eq!(CodeMapper::audio_format("single_host").unwrap(), 2);
        assert_eq!(CodeMapper::video_style("retro").unwrap(), 8);
        assert_eq!(CodeMapper::slide_deck_format("presenter").unwrap(), 2);
        assert_eq!(CodeMapper::slide_deck_length("long").unwrap(), 3);
        assert_eq!(CodeMapper::chat_goal(Some("analyze")).unwrap(), 3);
        assert_eq!(CodeMapper::response_length("short").unwrap(), 5);
    }

    #[test]
    fn chat_goal_defaults_when_absent() {
        assert_eq!(CodeMapper::chat_goal(None).unwrap(), 1);
    }

    #[test]
    fn unknown_name_lists_valid_options() {
        let err = CodeMapper::difficulty("extreme").unwrap_err();
        assert!(matches!(err, NotebookError::Validation(_)));
        let msg = err.to_string();
        assert!(msg.contains("extreme"));
        assert!(msg.contains("easy, medium, hard"));
    }

    #[test]
    fn remaining_tables() {
        assert_eq!(CodeMapper::audio_length("LONG").unwrap(), 3);
        assert_eq!(CodeMapper::infographic_orientation("portrait").unwrap(), 2);
        assert_eq!(CodeMapper::detail_level("Detailed").unwrap(), 3);
    }
}
