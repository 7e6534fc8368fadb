//! Known-error signatures.

use crate::{InfoBlock, Severity};
use regex::Regex;

/// Predicate over extracted text.
pub type TextPredicate = fn(&str) -> bool;

/// One way of recognizing a signature in text.
#[derive(Debug, Clone)]
pub enum Matcher {
    Pattern(Regex),
    /// Arbitrary check; when it fires the whole text is the excerpt.
    Predicate(TextPredicate),
}

impl Matcher {
    /// The part of `text` this matcher recognized, if any.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        match self {
            Matcher::Pattern(pattern) => pattern.find(text).map(|found| found.as_str()),
            Matcher::Predicate(predicate) => predicate(text).then_some(text),
        }
    }
}

/// A known error condition and the help text explaining it.
#[derive(Debug, Clone)]
pub struct DiagnosticSignature {
    pub matchers: Vec<Matcher>,
    pub title: String,
    pub explanation: String,
    pub tips: Vec<String>,
    pub link: Option<String>,
}

impl DiagnosticSignature {
    /// Excerpt from the first matcher that fires.
    pub fn first_match<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.matchers.iter().find_map(|matcher| matcher.find(text))
    }

    fn to_block(&self, excerpt: &str) -> InfoBlock {
        let mut block = InfoBlock::new(Severity::Notice, &self.title, &self.explanation)
            .with_tips(self.tips.iter().cloned())
            .with_excerpt(excerpt);
        if let Some(link) = &self.link {
            block = block.with_link(link);
        }
        block
    }
}

/// Evaluate every signature against `text`. Each firing signature yields one
/// block, in table order.
pub fn scan(signatures: &[DiagnosticSignature], text: &str) -> Vec<InfoBlock> {
    signatures
        .iter()
        .filter_map(|signature| {
            signature
                .first_match(text)
                .map(|excerpt| signature.to_block(excerpt))
        })
        .collect()
}

/// The built-in signature table.
pub fn builtin() -> Vec<DiagnosticSignature> {
    vec![
        DiagnosticSignature {
            matchers: vec![literal("SkinsRestorerAPI is not initialized yet")],
            title: "SkinsRestorerAPI is not initialized yet".into(),
            explanation: "This error occurs when a third-party plugin tries to access \
                SkinsRestorerAPI before SkinsRestorer is fully loaded. This is a bug in the \
                third-party plugin, and should be reported to the plugin developer."
                .into(),
            tips: vec![
                "Make sure SkinsRestorer is installed and enabled. There may have been a startup \
                 error that prevented SkinsRestorer from loading."
                    .into(),
                "Your plugin may be loading before SkinsRestorer. To load your plugin after \
                 SkinsRestorer, add `softdepend: [ \"SkinsRestorer\" ]` to your plugin.yml file."
                    .into(),
            ],
            link: Some(
                "https://skinsrestorer.net/docs/development/api#add-skinsrestorer-as-a-dependency"
                    .into(),
            ),
        },
        DiagnosticSignature {
            matchers: vec![literal("NoMappingException")],
            title: "Missing mapping in SkinsRestorer".into(),
            explanation: "This error occurs when the current build does not support the current \
                Minecraft version. Every new version of Minecraft requires a new mapping to be \
                added to SkinsRestorer because of Spigot's obfuscation."
                .into(),
            tips: vec![
                "Check announcements for updates for new versions of SkinsRestorer. If there is no \
                 update, please be patient."
                    .into(),
                "If PaperMC has released a new version, try switching from Spigot to Paper. We \
                 recommend PaperMC over Spigot because we don't use mappings for Paper."
                    .into(),
            ],
            link: None,
        },
    ]
}

fn literal(text: &str) -> Matcher {
    Matcher::Pattern(Regex::new(&regex::escape(text)).expect("hardcoded signature regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_excerpt_is_reported() {
        let text = "[12:00:01 ERROR]: NoMappingException: unsupported server version";
        let blocks = scan(&builtin(), text);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].title, "Missing mapping in SkinsRestorer");
        assert_eq!(blocks[0].excerpt.as_deref(), Some("NoMappingException"));
        assert_eq!(blocks[0].tips.len(), 2);
        assert!(blocks[0].link.is_none());
    }

    #[test]
    fn every_firing_signature_produces_a_block() {
        let text = "Caused by: SkinsRestorerAPI is not initialized yet\n\
                    ... later ...\n\
                    NoMappingException thrown";
        let titles: Vec<_> = scan(&builtin(), text)
            .into_iter()
            .map(|block| block.title)
            .collect();

        assert_eq!(
            titles,
            vec![
                "SkinsRestorerAPI is not initialized yet".to_string(),
                "Missing mapping in SkinsRestorer".to_string(),
            ]
        );
    }

    #[test]
    fn api_signature_carries_reference_link() {
        let blocks = scan(&builtin(), "SkinsRestorerAPI is not initialized yet!");

        assert_eq!(blocks.len(), 1);
        assert!(
            blocks[0]
                .link
                .as_deref()
                .is_some_and(|link| link.starts_with("https://skinsrestorer.net/"))
        );
    }

    #[test]
    fn unrelated_text_fires_nothing() {
        assert!(scan(&builtin(), "Done (3.2s)! For help, type \"help\"").is_empty());
    }

    #[test]
    fn predicate_matchers_report_the_whole_text() {
        fn mentions_offline_mode(text: &str) -> bool {
            text.contains("online-mode=false")
        }

        let signatures = vec![DiagnosticSignature {
            matchers: vec![literal("never present"), Matcher::Predicate(mentions_offline_mode)],
            title: "Offline mode".into(),
            explanation: "Server runs in offline mode.".into(),
            tips: Vec::new(),
            link: None,
        }];

        let text = "motd=hello\nonline-mode=false";
        let blocks = scan(&signatures, text);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].excerpt.as_deref(), Some(text));
    }

    #[test]
    fn signature_metacharacters_are_escaped() {
        let matcher = literal("a.b(c)");
        assert_eq!(matcher.find("xx a.b(c) yy"), Some("a.b(c)"));
        assert_eq!(matcher.find("aXb(c)"), None);
    }
}
