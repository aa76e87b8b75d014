use crate::validation::{Diagnostic, ValidationContext};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_QUICKSTART_TOPICS: &[&str] = &["Inventory", "Scanner", "Enforcer", "IAM Explain"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocLink {
    pub text: String,
    pub target: String,
    #[serde(default)]
    pub title: Option<String>,
    /// 1-based.
    pub line: usize,
    pub well_formed: bool,
}

impl DocLink {
    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    fn mentions(&self, topic: &str) -> bool {
        self.text.to_lowercase().contains(&topic.to_lowercase())
    }
}

struct Destination {
    target: String,
    title: Option<String>,
    well_formed: bool,
}

fn malformed(raw: &str) -> Destination {
    Destination {
        target: raw.to_string(),
        title: None,
        well_formed: false,
    }
}

// `dest`, `<dest with spaces>`, and either form followed by a quoted title.
fn parse_destination(raw: &str) -> Destination {
    let raw = raw.trim();
    let (target, rest) = if let Some(inner) = raw.strip_prefix('<') {
        match inner.split_once('>') {
            Some((target, rest)) => (target, rest),
            None => return malformed(raw),
        }
    } else {
        match raw.split_once(char::is_whitespace) {
            Some((target, rest)) => (target, rest),
            None => (raw, ""),
        }
    };

    if target.trim().is_empty() || target.contains(['<', '>', '\n']) {
        return malformed(raw);
    }

    let rest = rest.trim();
    let title = if rest.is_empty() {
        None
    } else {
        match parse_title(rest) {
            Some(title) => Some(title.to_string()),
            None => return malformed(raw),
        }
    };

    Destination {
        target: target.to_string(),
        title,
        well_formed: true,
    }
}

fn parse_title(rest: &str) -> Option<&str> {
    let quoted = move |open: char, close: char| {
        rest.strip_prefix(open)
            .and_then(|inner| inner.strip_suffix(close))
    };
    quoted('"', '"').or_else(|| quoted('\'', '\''))
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"!?\[([^\]]*)\]\(([^)]*)\)").expect("link pattern is valid")
    })
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

// Images and fenced code blocks are skipped.
pub fn extract_links(markdown: &str) -> Vec<DocLink> {
    let mut links = Vec::new();
    let mut open_fence: Option<&str> = None;
    for (index, line) in markdown.lines().enumerate() {
        match (open_fence, fence_marker(line)) {
            (None, Some(marker)) => {
                open_fence = Some(marker);
                continue;
            }
            (Some(open), Some(marker)) if open == marker => {
                open_fence = None;
                continue;
            }
            (Some(_), _) => continue,
            (None, None) => {}
        }

        for captures in link_pattern().captures_iter(line) {
            if captures[0].starts_with('!') {
                continue;
            }
            let destination = parse_destination(&captures[2]);
            links.push(DocLink {
                text: captures[1].trim().to_string(),
                target: destination.target,
                title: destination.title,
                line: index + 1,
                well_formed: destination.well_formed,
            });
        }
    }
    links
}

pub fn lint_doc_index<S: AsRef<str>>(markdown: &str, topics: &[S]) -> Vec<Diagnostic> {
    let links = extract_links(markdown);
    let mut ctx = ValidationContext::new();

    for topic in topics {
        let topic = topic.as_ref();
        ctx.push(format!("topic {}", topic));
        let matching: Vec<&DocLink> = links.iter().filter(|link| link.mentions(topic)).collect();
        if matching.is_empty() {
            ctx.error(format!("no quickstart link found for '{}'", topic));
        }
        for link in matching {
            if !link.is_well_formed() {
                ctx.error(format!(
                    "link '{}' on line {} has a malformed target '{}'",
                    link.text, link.line, link.target
                ));
            }
        }
        ctx.pop();
    }

    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    for link in &links {
        let target = link.target.trim();
        if target.is_empty() || !link.well_formed {
            continue;
        }
        if let Some(line) = first_seen.get(target) {
            ctx.push(format!("line {}", link.line));
            ctx.warning(format!(
                "target '{}' is already linked on line {}",
                target, line
            ));
            ctx.pop();
        } else {
            first_seen.insert(target, link.line);
        }
    }

    ctx.finish()
}
