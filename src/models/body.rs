//! Record body sections.
//!
//! Bodies are free-form markdown. The recommended layout is:
//!
//! ```text
//! ## Objective
//! What the work achieves.
//!
//! ## Acceptance Criteria
//! - [ ] first criterion
//! - [x] second criterion
//!
//! ## Notes
//! ```
//!
//! Helpers here read and extend those sections without imposing them.

pub const OBJECTIVE: &str = "Objective";
pub const ACCEPTANCE: &str = "Acceptance Criteria";
pub const DELIVERABLES: &str = "Deliverables";
pub const NOTES: &str = "Notes";
pub const FAILURE: &str = "Failure";

/// Build a body with an objective and an acceptance checklist.
pub fn compose(objective: Option<&str>, criteria: &[String]) -> String {
    let mut out = String::new();
    if let Some(objective) = objective.map(str::trim).filter(|o| !o.is_empty()) {
        out.push_str(&format!("## {}\n\n{}\n", OBJECTIVE, objective));
    }
    if !criteria.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("## {}\n\n", ACCEPTANCE));
        for criterion in criteria {
            out.push_str(&format!("- [ ] {}\n", criterion.trim()));
        }
    }
    out.trim_end().to_string()
}

/// Lines of a `## <name>` section, excluding the heading.
pub fn section<'a>(body: &'a str, name: &str) -> Vec<&'a str> {
    let mut lines = Vec::new();
    let mut inside = false;
    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            inside = heading.trim().eq_ignore_ascii_case(name);
            continue;
        }
        if inside {
            lines.push(line);
        }
    }
    lines
}

/// The body with every `## <name>` section in `names` removed, heading included.
pub fn without_sections(body: &str, names: &[&str]) -> String {
    let mut kept = Vec::new();
    let mut skipping = false;
    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            skipping = names.iter().any(|n| heading.trim().eq_ignore_ascii_case(n));
        }
        if !skipping {
            kept.push(line);
        }
    }
    kept.join("\n")
}

/// The objective paragraph, if present.
pub fn objective(body: &str) -> Option<String> {
    let text = section(body, OBJECTIVE).join("\n").trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Acceptance criteria: checklist items of the acceptance section.
pub fn acceptance_criteria(body: &str) -> Vec<String> {
    section(body, ACCEPTANCE)
        .into_iter()
        .filter_map(checklist_item)
        .collect()
}

/// Bullet items of the deliverables section.
pub fn deliverables(body: &str) -> Vec<String> {
    section(body, DELIVERABLES)
        .into_iter()
        .filter_map(bullet_item)
        .collect()
}

fn checklist_item(line: &str) -> Option<String> {
    let trimmed = line.trim();
    ["- [ ] ", "- [x] ", "- [X] ", "* [ ] ", "* [x] "]
        .iter()
        .find_map(|marker| trimmed.strip_prefix(marker))
        .map(|rest| rest.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn bullet_item(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if let Some(item) = checklist_item(trimmed) {
        return Some(item);
    }
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .map(|rest| rest.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Append a paragraph under `## <name>`, creating the section at the end if absent.
pub fn append_to_section(body: &str, name: &str, text: &str) -> String {
    let text = text.trim();
    let heading = format!("## {}", name);
    let mut lines: Vec<String> = body.lines().map(str::to_string).collect();

    let start = lines
        .iter()
        .position(|l| l.trim().eq_ignore_ascii_case(&heading));
    match start {
        Some(start) => {
            let end = lines[start + 1..]
                .iter()
                .position(|l| l.starts_with("## "))
                .map(|p| start + 1 + p)
                .unwrap_or(lines.len());
            let mut insert_at = end;
            while insert_at > start + 1 && lines[insert_at - 1].trim().is_empty() {
                insert_at -= 1;
            }
            lines.splice(insert_at..insert_at, ["".to_string(), text.to_string()]);
        }
        None => {
            while lines.last().is_some_and(|l| l.trim().is_empty()) {
                lines.pop();
            }
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.push(heading);
            lines.push(String::new());
            lines.push(text.to_string());
        }
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_and_read_back() {
        let body = compose(
            Some("Ship the parser"),
            &["parses headers".to_string(), "rejects junk".to_string()],
        );
        assert_eq!(objective(&body).as_deref(), Some("Ship the parser"));
        assert_eq!(
            acceptance_criteria(&body),
            vec!["parses headers".to_string(), "rejects junk".to_string()]
        );
    }

    #[test]
    fn test_compose_empty() {
        assert_eq!(compose(None, &[]), "");
        assert_eq!(compose(Some("  "), &[]), "");
    }

    #[test]
    fn test_acceptance_ignores_other_sections() {
        let body = "## Notes\n- [ ] not a criterion\n\n## Acceptance Criteria\n- [x] done one\n- [ ] open one\nplain line\n";
        assert_eq!(acceptance_criteria(body), vec!["done one", "open one"]);
    }

    #[test]
    fn test_without_sections() {
        let text = "## Objective\n\nDo it.\n\n## Notes\n\nnote\n\n## failure\n\nbroke\n\n## Deliverables\n\n- one";
        let kept = without_sections(text, &[NOTES, FAILURE]);
        assert!(kept.contains("Do it."));
        assert!(kept.contains("- one"));
        assert!(!kept.contains("note"));
        assert!(!kept.contains("broke"));
        assert!(!kept.contains("## Notes"));
    }

    #[test]
    fn test_deliverables() {
        let body = "## Deliverables\n- API\n* CLI\n- [ ] docs\n\n## Notes\n- nope";
        assert_eq!(deliverables(body), vec!["API", "CLI", "docs"]);
    }

    #[test]
    fn test_append_creates_section() {
        let body = append_to_section("## Objective\n\nDo it", FAILURE, "disk full");
        assert_eq!(body, "## Objective\n\nDo it\n\n## Failure\n\ndisk full");
    }

    #[test]
    fn test_append_extends_existing_section() {
        let body = "## Notes\n\nfirst\n\n## Objective\n\nx";
        let body = append_to_section(body, NOTES, "second");
        assert_eq!(section(&body, NOTES).join("\n").trim(), "first\n\nsecond");
        assert_eq!(objective(&body).as_deref(), Some("x"));
    }

    #[test]
    fn test_append_to_empty_body() {
        assert_eq!(append_to_section("", NOTES, "hello"), "## Notes\n\nhello");
    }
}
