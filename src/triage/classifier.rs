//! Runs both diagnostic passes over extracted text.

use crate::release::ReleaseCache;
use crate::triage::dump::{self, DumpReport};
use crate::triage::signatures::{self, DiagnosticSignature};
use crate::InfoBlock;

/// Everything recognized in one piece of text.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// One block per firing signature, in table order.
    pub signatures: Vec<InfoBlock>,
    /// Present only when the text was a diagnostic dump.
    pub dump: Option<DumpReport>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty() && self.dump.is_none()
    }
}

/// Signature scan plus dump analysis.
#[derive(Debug, Clone)]
pub struct Classifier {
    signatures: Vec<DiagnosticSignature>,
    release: ReleaseCache,
    download_url: String,
}

impl Classifier {
    pub fn new(
        signatures: Vec<DiagnosticSignature>,
        release: ReleaseCache,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            signatures,
            release,
            download_url: download_url.into(),
        }
    }

    /// Classifier over the built-in signature table.
    pub fn builtin(release: ReleaseCache, download_url: impl Into<String>) -> Self {
        Self::new(signatures::builtin(), release, download_url)
    }

    /// Both passes always run; neither can prevent the other.
    pub fn classify(&self, text: &str) -> Classification {
        let signatures = signatures::scan(&self.signatures, text);
        let latest = self.release.latest();
        let dump = dump::analyze(text, latest.as_deref(), &self.download_url);

        Classification { signatures, dump }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::ReleaseMetadata;

    fn classifier(latest: Option<&str>) -> Classifier {
        let release = match latest {
            Some(tag) => ReleaseCache::with_release(ReleaseMetadata {
                tag_name: tag.into(),
                html_url: None,
                assets: Vec::new(),
            }),
            None => ReleaseCache::new(),
        };
        Classifier::builtin(release, "https://modrinth.com/plugin/skinsrestorer/version")
    }

    #[test]
    fn plain_log_yields_signatures_only() {
        let result = classifier(Some("15.0.0")).classify("java.lang.NoMappingException: 1.21");

        assert_eq!(result.signatures.len(), 1);
        assert!(result.dump.is_none());
    }

    #[test]
    fn dump_containing_a_signature_yields_both() {
        let text = r#"{"buildInfo": {"version": "14.0.0"}, "notes": "NoMappingException"}"#;
        let result = classifier(Some("15.0.0")).classify(text);

        assert_eq!(result.signatures.len(), 1);
        let dump = result.dump.expect("dump should be recognized");
        assert!(dump.blocks[0].title.starts_with("Important: Outdated"));
    }

    #[test]
    fn unrelated_text_is_empty() {
        assert!(classifier(None).classify("hello there").is_empty());
    }
}
