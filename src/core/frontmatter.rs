use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::document::dedup_tags;

lazy_static! {
    static ref FRONTMATTER_RE: Regex = Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---[ \t]*(\r?\n|$)").unwrap();
    static ref TITLE_RE: Regex = Regex::new(r"(?m)^title:[ \t]*(.+)$").unwrap();
    static ref TAGS_RE: Regex = Regex::new(r"(?m)^tags:\s*\[(.*?)\]").unwrap();
    static ref HEADING_RE: Regex = Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*#*[ \t]*$").unwrap();
}

/// Metadata parsed from a markdown file's YAML frontmatter.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
struct RawFrontmatter {
    title: Option<String>,
    tags: Option<TagsField>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsField {
    List(Vec<String>),
    Inline(String),
}

impl Frontmatter {
    /// Parse the leading `---` block, if any.
    ///
    /// Malformed YAML falls back to line-oriented extraction of `title:` and
    /// `tags: [...]` so a single stray colon does not hide a whole file's tags.
    pub fn parse(content: &str) -> Option<Self> {
        let caps = FRONTMATTER_RE.captures(content)?;
        let raw = caps.get(1)?.as_str();

        match serde_yaml::from_str::<RawFrontmatter>(raw) {
            Ok(parsed) => Some(Self {
                title: parsed.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
                tags: match parsed.tags {
                    Some(TagsField::List(tags)) => {
                        dedup_tags(tags.iter().map(|t| normalize_tag(t)))
                    }
                    Some(TagsField::Inline(s)) => split_inline_tags(&s),
                    None => Vec::new(),
                },
            }),
            Err(_) => Some(Self {
                title: TITLE_RE
                    .captures(raw)
                    .map(|c| unquote(&c[1]).to_string())
                    .filter(|t| !t.is_empty()),
                tags: TAGS_RE
                    .captures(raw)
                    .map(|c| split_inline_tags(&c[1]))
                    .unwrap_or_default(),
            }),
        }
    }
}

/// Content with the frontmatter block removed.
pub fn strip_frontmatter(content: &str) -> &str {
    match FRONTMATTER_RE.find(content) {
        Some(m) => &content[m.end()..],
        None => content,
    }
}

/// First `# Heading` in the body.
pub fn first_heading(body: &str) -> Option<String> {
    HEADING_RE
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .filter(|h| !h.is_empty())
}

fn split_inline_tags(s: &str) -> Vec<String> {
    dedup_tags(
        s.trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(normalize_tag),
    )
}

fn normalize_tag(tag: &str) -> String {
    unquote(tag).trim_start_matches('#').to_string()
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"').trim_matches('\'')
}
