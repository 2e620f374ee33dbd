//! Derive `description` and `acceptance_criteria` from extracted sections.

use crate::extract::{SectionMap, is_acceptance_header};

const DESCRIPTION: &str = "Description";
const ACCEPTANCE_CRITERIA: &str = "Acceptance Criteria";

/// Unrendered story body fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyFields {
    pub description: String,
    pub acceptance_criteria: Option<String>,
}

/// Build the body fields from the section map.
///
/// `description` comes from a `Description` section when one exists;
/// otherwise it is everything from `scan_start` up to (not including) the
/// first `**Acceptance Criteria:**` line. An acceptance-criteria section
/// that trims to nothing is reported as absent.
pub fn synthesize_fields(lines: &[&str], sections: &SectionMap, scan_start: usize) -> BodyFields {
    let acceptance_criteria = sections
        .get(ACCEPTANCE_CRITERIA)
        .map(|s| join_trimmed(&s.lines))
        .filter(|text| !text.is_empty());

    let description = match sections.get(DESCRIPTION) {
        Some(section) => join_trimmed(&section.lines),
        None => {
            let rest = lines.get(scan_start..).unwrap_or_default();
            let end = rest
                .iter()
                .position(|line| is_acceptance_header(line))
                .unwrap_or(rest.len());
            rest[..end].join("\n").trim().to_string()
        }
    };

    BodyFields {
        description,
        acceptance_criteria,
    }
}

fn join_trimmed(lines: &[String]) -> String {
    lines.join("\n").trim().to_string()
}
