//! Markdown user story parsing.
//!
//! Turns a loosely formatted story document into [`StoryFields`]:
//! 1. Pick the title (first `# ` heading, else first non-blank line)
//! 2. Group the lines after it under `**Name:**` section headers
//! 3. Derive description and acceptance criteria from the sections
//! 4. Optionally render both to HTML

mod extract;
mod render;
mod synthesize;

use std::path::Path;

use tracing::{debug, instrument};

use storypub_shared::{Result, StoryFields, StoryPubError};

pub use extract::{
    LineKind, Section, SectionMap, TitleLine, classify_line, extract_title, is_acceptance_header,
    normalize_title, parse_sections,
};
pub use render::render_html;
pub use synthesize::{BodyFields, synthesize_fields};

/// Options for [`parse_story`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Render description and acceptance criteria to HTML.
    pub render_html: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { render_html: true }
    }
}

/// Parse story text into fields. Pure; fails only when no title can be found.
///
/// A leading byte-order mark is ignored.
pub fn parse_story(content: &str, opts: &ParseOptions) -> Result<StoryFields> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let lines: Vec<&str> = content.trim().lines().collect();

    let TitleLine { title, line_index } = extract_title(&lines)?;
    let scan_start = line_index + 1;
    let sections = parse_sections(&lines, scan_start);
    let BodyFields {
        description,
        acceptance_criteria,
    } = synthesize_fields(&lines, &sections, scan_start);

    debug!(
        %title,
        sections = sections.len(),
        description_len = description.len(),
        has_acceptance_criteria = acceptance_criteria.is_some(),
        "parsed story"
    );

    let (description, acceptance_criteria) = if opts.render_html {
        (
            render_html(&description),
            acceptance_criteria.as_deref().map(render_html),
        )
    } else {
        (description, acceptance_criteria)
    };

    Ok(StoryFields {
        title,
        description,
        acceptance_criteria,
    })
}

/// Read a story file (`\n` or `\r\n` line endings) and parse it.
#[instrument(skip(opts), fields(path = %path.display()))]
pub fn parse_story_file(path: &Path, opts: &ParseOptions) -> Result<StoryFields> {
    let content = std::fs::read_to_string(path).map_err(|e| StoryPubError::io(path, e))?;
    parse_story(&content, opts)
}
