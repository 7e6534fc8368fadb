//! Paste-service link detection.
//!
//! A [`RuleTable`] is an ordered list of [`DetectionRule`]s. Resolution walks the
//! rules in order and returns the first hit, so earlier rules take priority.

use crate::error::RuleError;
use regex::Regex;

/// Placeholder in a URL template replaced by the rule's first capture group.
const CODE_PLACEHOLDER: &str = "{code}";

/// Built-in rules: (pattern, raw content URL template).
const BUILTIN_RULES: &[(&str, &str)] = &[
    (r"https?://hastebin\.com/(\w+)(?:\.\w+)?", "https://hastebin.com/raw/{code}"),
    (r"https?://hasteb\.in/(\w+)(?:\.\w+)?", "https://hasteb.in/raw/{code}"),
    (r"https?://paste\.helpch\.at/(\w+)(?:\.\w+)?", "https://paste.helpch.at/raw/{code}"),
    (r"https?://bytebin\.lucko\.me/(\w+)", "https://bytebin.lucko.me/{code}"),
    (r"https?://pastes\.dev/(\w+)", "https://bytebin.lucko.me/{code}"),
    (r"https?://paste\.lucko\.me/(\w+)(?:\.\w+)?", "https://paste.lucko.me/raw/{code}"),
    (r"https?://pastebin\.com/(\w+)(?:\.\w+)?", "https://pastebin.com/raw/{code}"),
    (r"https?://gist\.github\.com/(\w+/\w+)(?:\.\w+/\w+)?", "https://gist.github.com/{code}/raw/"),
    (r"https?://gitlab\.com/snippets/(\w+)(?:\.\w+)?", "https://gitlab.com/snippets/{code}/raw"),
];

/// Maps a link pattern to the URL serving the raw content behind it.
#[derive(Debug, Clone)]
pub struct DetectionRule {
    pattern: Regex,
    template: String,
}

impl DetectionRule {
    /// Compile a rule. The pattern must have at least one capture group and the
    /// template must contain `{code}`.
    pub fn new(pattern: &str, template: &str) -> Result<Self, RuleError> {
        let compiled = Regex::new(pattern).map_err(|error| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            message: error.to_string(),
        })?;

        // captures_len counts the implicit whole-match group.
        if compiled.captures_len() < 2 {
            return Err(RuleError::MissingCaptureGroup {
                pattern: pattern.to_string(),
            });
        }

        if !template.contains(CODE_PLACEHOLDER) {
            return Err(RuleError::MissingPlaceholder {
                template: template.to_string(),
            });
        }

        Ok(Self {
            pattern: compiled,
            template: template.to_string(),
        })
    }

    fn apply(&self, haystack: &str) -> Option<(String, String)> {
        let captures = self.pattern.captures(haystack)?;
        let code = captures.get(1)?;
        let matched = captures.get(0)?;

        Some((
            self.template.replace(CODE_PLACEHOLDER, code.as_str()),
            matched.as_str().to_string(),
        ))
    }
}

/// A link found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// URL serving the raw paste content.
    pub raw_url: String,
    /// The substring of the message that matched, kept for attribution.
    pub matched: String,
    /// Index of the rule that produced this link.
    pub rule_index: usize,
}

/// Ordered, immutable list of detection rules.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<DetectionRule>,
}

impl RuleTable {
    pub fn new(rules: Vec<DetectionRule>) -> Self {
        Self { rules }
    }

    /// Build a table from (pattern, template) pairs, rejecting the first invalid rule.
    pub fn from_specs(specs: &[(&str, &str)]) -> Result<Self, RuleError> {
        let rules = specs
            .iter()
            .map(|(pattern, template)| DetectionRule::new(pattern, template))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    /// The paste services Steward understands out of the box.
    pub fn builtin() -> Self {
        Self::from_specs(BUILTIN_RULES).expect("hardcoded detection rules")
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the first rule matching the message body or any embed field.
    ///
    /// For each rule the body is checked before the embed fields, so rule
    /// order always wins over where in the message the link appears.
    pub fn resolve<S: AsRef<str>>(&self, text: &str, embed_fields: &[S]) -> Option<ResolvedLink> {
        self.rules.iter().enumerate().find_map(|(rule_index, rule)| {
            std::iter::once(text)
                .chain(embed_fields.iter().map(AsRef::as_ref))
                .find_map(|haystack| rule.apply(haystack))
                .map(|(raw_url, matched)| ResolvedLink {
                    raw_url,
                    matched,
                    rule_index,
                })
        })
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}
