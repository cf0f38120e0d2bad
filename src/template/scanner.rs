use std::sync::LazyLock;

use regex::Regex;

// `%%` is matched first so an escaped percent sign never starts a placeholder.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%%|%([ILs]):([A-Za-z]+)").expect("placeholder pattern is valid")
});

/// How a placeholder's value is escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sigil {
    /// `%I` - quoted SQL identifier.
    Identifier,
    /// `%L` - quoted SQL literal, or `NULL`.
    Literal,
    /// `%s` - substituted verbatim.
    Raw,
}

impl Sigil {
    fn from_marker(marker: &str) -> Option<Sigil> {
        match marker {
            "I" => Some(Sigil::Identifier),
            "L" => Some(Sigil::Literal),
            "s" => Some(Sigil::Raw),
            _ => None,
        }
    }

    #[must_use]
    pub fn marker(self) -> char {
        match self {
            Sigil::Identifier => 'I',
            Sigil::Literal => 'L',
            Sigil::Raw => 's',
        }
    }
}

/// One `%<sigil>:<name>` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'a> {
    pub sigil: Sigil,
    pub name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Segment<'a> {
    Text(&'a str),
    Placeholder(Placeholder<'a>),
}

/// Split a template into literal text and placeholders, in occurrence order.
pub(super) fn scan(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let (Some(marker), Some(name)) = (caps.get(1), caps.get(2)) else {
            // `%%` collapses to a single `%`.
            if whole.start() > last {
                segments.push(Segment::Text(&template[last..whole.start()]));
            }
            segments.push(Segment::Text("%"));
            last = whole.end();
            continue;
        };
        let Some(sigil) = Sigil::from_marker(marker.as_str()) else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Text(&template[last..whole.start()]));
        }
        segments.push(Segment::Placeholder(Placeholder {
            sigil,
            name: name.as_str(),
        }));
        last = whole.end();
    }

    if last < template.len() {
        segments.push(Segment::Text(&template[last..]));
    }
    segments
}

pub(super) fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER
        .captures_iter(template)
        .any(|caps| caps.get(1).is_some())
}
