use regex::{Regex, RegexBuilder};

use crate::{
    config::CodeGrammar,
    error::{Error, Result},
};

/// Characters stripped from the end of a raw code.
const TRAILING_PUNCTUATION: [char; 4] = ['.', ':', ';', ','];

/// Finds reference codes after a trigger literal and normalizes them.
///
/// The extractor holds only the compiled pattern and can be shared across
/// threads and reused for any number of pages.
#[derive(Debug, Clone)]
pub struct CodeExtractor {
    pattern: Regex,
}

impl CodeExtractor {
    pub fn new(trigger: &str, grammar: &CodeGrammar) -> Result<Self> {
        let trigger = trigger.trim();
        if trigger.is_empty() {
            return Err(Error::Config("trigger literal is empty".into()));
        }

        let pattern = match grammar {
            CodeGrammar::Strict => format!(
                r"(?i){}\s*([\p{{L}}\p{{N}}-]+)",
                regex::escape(trigger)
            ),
            CodeGrammar::UntilSlash => {
                format!(r"(?i){}\s*(.+?)/", regex::escape(trigger))
            }
            CodeGrammar::Custom(pattern) => pattern.clone(),
        };

        // Page text is case-folded before matching, so custom patterns
        // must be too.
        let pattern = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                Error::Config(format!("invalid code pattern {pattern:?}: {e}"))
            })?;
        if pattern.captures_len() < 2 {
            return Err(Error::Config(format!(
                "code pattern {:?} has no capture group",
                pattern.as_str()
            )));
        }

        Ok(Self { pattern })
    }

    /// Lazily yield the normalized codes found in `text`, in order of
    /// appearance. Matches that normalize to nothing are dropped.
    pub fn extract<'a>(
        &'a self,
        text: &'a str,
    ) -> impl Iterator<Item = String> + 'a {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|raw| normalize(raw.as_str()))
    }
}

/// Normalize a raw code: trim, run-strip trailing `.` `:` `;` `,` (and any
/// whitespace they uncover), then case-fold. Returns `None` if nothing is
/// left.
///
/// ```
/// use refindex::codes::normalize;
///
/// assert_eq!(normalize("  ABC-123.;: ").as_deref(), Some("abc-123"));
/// assert_eq!(normalize(" ., "), None);
/// ```
pub fn normalize(raw: &str) -> Option<String> {
    let code = raw.trim().trim_end_matches(|c: char| {
        c.is_whitespace() || TRAILING_PUNCTUATION.contains(&c)
    });
    (!code.is_empty()).then(|| code.to_lowercase())
}
