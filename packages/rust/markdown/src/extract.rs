//! Title and section extraction.
//!
//! Lines are classified one at a time by [`classify_line`]; the scanners
//! below only decide what to do with each classification.
//!
//! - Heading: `# Title` (any leading indentation, exactly one `#`)
//! - Section header: `**Name:**` alone on a line
//! - Everything else is plain text

use std::sync::LazyLock;

use regex::Regex;

use storypub_shared::{Result, StoryPubError};

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches `# Title` with optional leading whitespace.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#\s+(.+)$").expect("heading regex"));

/// Matches `**Name:**` with optional surrounding whitespace.
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\*\*([^*]+):\*\*\s*$").expect("section regex"));

/// Matches the acceptance-criteria header specifically.
static ACCEPTANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\*\*Acceptance Criteria:\*\*\s*$").expect("acceptance regex")
});

/// Matches a leading `User Story:` label.
static USER_STORY_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*user\s*story:\s*").expect("prefix regex"));

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// What a single document line is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// A top-level heading; carries the trimmed heading text.
    Heading(&'a str),
    /// A bold section header; carries the trimmed section name.
    SectionHeader(&'a str),
    Plain,
}

/// Classify a line. Pure and total.
pub fn classify_line(line: &str) -> LineKind<'_> {
    if let Some(caps) = SECTION_RE.captures(line) {
        if let Some(name) = caps.get(1) {
            return LineKind::SectionHeader(name.as_str().trim());
        }
    }
    if let Some(caps) = HEADING_RE.captures(line) {
        if let Some(text) = caps.get(1) {
            let text = text.as_str().trim();
            if !text.is_empty() {
                return LineKind::Heading(text);
            }
        }
    }
    LineKind::Plain
}

/// Whether `line` is exactly an `**Acceptance Criteria:**` header (any case).
pub fn is_acceptance_header(line: &str) -> bool {
    ACCEPTANCE_RE.is_match(line)
}

// ---------------------------------------------------------------------------
// Title
// ---------------------------------------------------------------------------

/// A resolved title and the index of the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleLine {
    pub title: String,
    pub line_index: usize,
}

/// Find the title: the first heading, else the first non-blank line.
///
/// The result is normalized with [`normalize_title`]. Fails with
/// [`StoryPubError::NoTitleFound`] when every line is blank or the title
/// is nothing but the `User Story:` label.
pub fn extract_title(lines: &[&str]) -> Result<TitleLine> {
    let heading = lines
        .iter()
        .enumerate()
        .find_map(|(idx, line)| match classify_line(line) {
            LineKind::Heading(text) => Some((idx, text)),
            _ => None,
        });

    let (line_index, raw) = heading
        .or_else(|| {
            lines
                .iter()
                .enumerate()
                .map(|(idx, line)| (idx, line.trim()))
                .find(|(_, line)| !line.is_empty())
        })
        .ok_or(StoryPubError::NoTitleFound)?;

    let title = normalize_title(raw);
    if title.is_empty() {
        return Err(StoryPubError::NoTitleFound);
    }

    Ok(TitleLine { title, line_index })
}

/// Strip the legacy `User Story:` label (case-insensitive) and trim.
///
/// Repeated labels are all removed, so normalizing twice is a no-op.
pub fn normalize_title(raw: &str) -> String {
    let mut title = raw.trim();
    while let Some(m) = USER_STORY_PREFIX_RE.find(title) {
        title = title[m.end()..].trim();
    }
    title.to_string()
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// A named section and its raw lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub lines: Vec<String>,
}

/// Sections in document order.
///
/// Re-opening an existing name (exact match) clears its lines but keeps
/// its first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    sections: Vec<Section>,
}

impl SectionMap {
    /// First section whose name matches `name` ignoring case.
    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.to_lowercase() == name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Start (or restart) a section and return its index.
    fn open(&mut self, name: &str) -> usize {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            self.sections[idx].lines.clear();
            return idx;
        }
        self.sections.push(Section {
            name: name.to_string(),
            lines: Vec::new(),
        });
        self.sections.len() - 1
    }
}

/// Group lines from `start` onward under the most recent section header.
///
/// Lines before the first header are not attributed. Never fails.
pub fn parse_sections(lines: &[&str], start: usize) -> SectionMap {
    let mut map = SectionMap::default();
    let mut current: Option<usize> = None;

    for line in lines.iter().skip(start) {
        match classify_line(line) {
            LineKind::SectionHeader(name) => current = Some(map.open(name)),
            _ => {
                if let Some(idx) = current {
                    map.sections[idx].lines.push((*line).to_string());
                }
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_heading_with_indentation() {
        assert_eq!(classify_line("#  Login flow "), LineKind::Heading("Login flow"));
        assert_eq!(classify_line("   # Login flow"), LineKind::Heading("Login flow"));
        assert_eq!(classify_line("\t# Tabbed"), LineKind::Heading("Tabbed"));
    }

    #[test]
    fn classify_rejects_non_h1_and_empty_headings() {
        assert_eq!(classify_line("## Sub heading"), LineKind::Plain);
        assert_eq!(classify_line("#NoSpace"), LineKind::Plain);
        assert_eq!(classify_line("#   "), LineKind::Plain);
    }

    #[test]
    fn classify_section_headers() {
        assert_eq!(
            classify_line("**Description:**"),
            LineKind::SectionHeader("Description")
        );
        assert_eq!(
            classify_line("  ** Acceptance Criteria :**  "),
            LineKind::SectionHeader("Acceptance Criteria")
        );
        // Trailing text after the header disqualifies it.
        assert_eq!(classify_line("**Description:** inline"), LineKind::Plain);
        // Colon must sit inside the bold markers.
        assert_eq!(classify_line("**Description**:"), LineKind::Plain);
        assert_eq!(classify_line("**Notes**"), LineKind::Plain);
    }

    #[test]
    fn acceptance_header_is_case_insensitive_but_exact() {
        assert!(is_acceptance_header("**acceptance criteria:**"));
        assert!(is_acceptance_header("  **Acceptance Criteria:**  "));
        assert!(!is_acceptance_header("** Acceptance Criteria:**"));
        assert!(!is_acceptance_header("**Acceptance Criteria:** see below"));
    }

    #[test]
    fn title_from_first_heading() {
        let lines = ["intro text", "", "  # User Story: Reset password", "body"];
        let t = extract_title(&lines).expect("title");
        assert_eq!(t.title, "Reset password");
        assert_eq!(t.line_index, 2);
    }

    #[test]
    fn title_falls_back_to_first_non_blank_line() {
        let lines = ["", "   ", "  Checkout with saved card  ", "more"];
        let t = extract_title(&lines).expect("title");
        assert_eq!(t.title, "Checkout with saved card");
        assert_eq!(t.line_index, 2);
    }

    #[test]
    fn blank_document_has_no_title() {
        assert!(matches!(
            extract_title(&["", "  ", "\t"]),
            Err(StoryPubError::NoTitleFound)
        ));
        assert!(matches!(extract_title(&[]), Err(StoryPubError::NoTitleFound)));
    }

    #[test]
    fn label_only_title_is_rejected() {
        assert!(matches!(
            extract_title(&["# User Story:"]),
            Err(StoryPubError::NoTitleFound)
        ));
    }

    #[test]
    fn normalize_title_strips_label_any_case() {
        assert_eq!(normalize_title("User Story: Login"), "Login");
        assert_eq!(normalize_title("  user story:Login"), "Login");
        assert_eq!(normalize_title("USERSTORY:   Login "), "Login");
        assert_eq!(normalize_title("Login: User Story"), "Login: User Story");
    }

    #[test]
    fn normalize_title_is_idempotent() {
        for raw in [
            "User Story: Login",
            "User Story: User Story: Login",
            "Plain title",
            "  spaced  ",
        ] {
            let once = normalize_title(raw);
            assert_eq!(normalize_title(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn sections_collect_verbatim_lines_after_start() {
        let lines = [
            "# Title",
            "**Ignored:**",
            "preamble",
            "**Description:**",
            "  indented line",
            "",
            "**Acceptance Criteria:**",
            "- one",
        ];
        let map = parse_sections(&lines, 2);
        assert_eq!(map.len(), 2);
        assert!(map.get("ignored").is_none());

        let desc = map.get("description").expect("description");
        assert_eq!(desc.lines, vec!["  indented line".to_string(), String::new()]);

        let names: Vec<&str> = map.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Description", "Acceptance Criteria"]);
    }

    #[test]
    fn lines_before_first_header_are_unattributed() {
        let lines = ["stray", "text", "**Notes:**", "kept"];
        let map = parse_sections(&lines, 0);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("NOTES").expect("notes").lines, vec!["kept".to_string()]);
    }

    #[test]
    fn duplicate_section_last_occurrence_wins_in_place() {
        let lines = [
            "**Description:**",
            "first",
            "**Notes:**",
            "n",
            "**Description:**",
            "second",
        ];
        let map = parse_sections(&lines, 0);
        let names: Vec<&str> = map.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Description", "Notes"]);
        assert_eq!(map.get("Description").expect("desc").lines, vec!["second".to_string()]);
    }

    #[test]
    fn case_variants_are_distinct_keys_but_lookup_returns_first() {
        let lines = ["**description:**", "lower", "**Description:**", "upper"];
        let map = parse_sections(&lines, 0);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("DESCRIPTION").expect("desc").lines, vec!["lower".to_string()]);
    }
}
