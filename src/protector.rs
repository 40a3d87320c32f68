//! Markdown protection for translation.
//!
//! Masks markdown constructs that the model must not touch (HTML blocks,
//! images, links, code, table rows, rules, empty headers) with placeholder
//! tokens and restores them afterwards. The mask lives in the returned
//! [`Protected`] value, so every protect/restore cycle is independent.

use crate::error::TranslationError;
use regex::Regex;
use std::sync::LazyLock;

/// Prefix shared by every placeholder token.
pub const PLACEHOLDER_PREFIX: &str = "__PRESERVED_";

/// Patterns to preserve, in the order they are applied.
///
/// Later patterns run over the output of earlier ones, so inline code inside
/// a table row is already a placeholder when the row pattern runs.
/// Placeholder-shaped text already in the source is masked first so it can
/// never collide with a generated placeholder.
static PRESERVE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"__PRESERVED_\d+_[A-Z]+__", "LITERAL"),
        (r"(?m)<div[^>]*>.*?</div>", "DIV"),
        (r"(?m)<img[^>]*/?>", "IMG"),
        (r"(?ms)<table[^>]*>.*?</table>", "TABLE"),
        (r"!\[([^\]]*)\]\(([^)]+)\)", "IMAGE"),
        (r"\[([^\]]+)\]\(([^)]+)\)", "LINK"),
        (r"```[\s\S]*?```", "CODEBLOCK"),
        (r"`[^`]+`", "CODE"),
        (r"(?m)^\|.+\|$", "TABLEROW"),
        (r"(?m)^---+$", "HR"),
        (r"(?m)^#+\s*$", "EMPTYHEADER"),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("Invalid PRESERVE_PATTERNS"), kind))
    .collect()
});

/// Text with markdown constructs replaced by placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    /// The masked text to send to the model.
    pub text: String,
    /// Placeholder and original fragment pairs, in creation order.
    fragments: Vec<(String, String)>,
}

impl Protected {
    /// Number of placeholders created.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Returns true if nothing was masked.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Iterates over `(placeholder, original)` pairs.
    pub fn fragments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fragments
            .iter()
            .map(|(placeholder, original)| (placeholder.as_str(), original.as_str()))
    }

    /// Checks that every placeholder visible in the masked text occurs
    /// exactly once in `output`.
    ///
    /// Placeholders swallowed by a later pattern (e.g. inline code inside a
    /// table row) are not visible to the model and are not checked.
    pub fn verify(&self, output: &str) -> Result<(), TranslationError> {
        for (placeholder, _) in &self.fragments {
            if !self.text.contains(placeholder.as_str()) {
                continue;
            }

            let count = output.matches(placeholder.as_str()).count();
            if count != 1 {
                return Err(TranslationError::PlaceholderMismatch {
                    placeholder: placeholder.clone(),
                    count,
                });
            }
        }

        Ok(())
    }

    /// Replaces every placeholder in `output` with its original fragment.
    ///
    /// Runs newest first: a fragment captured by a later pattern may itself
    /// contain earlier placeholders, which are then resolved in turn.
    pub fn restore(&self, output: &str) -> String {
        let mut result = output.to_string();
        for (placeholder, original) in self.fragments.iter().rev() {
            result = result.replace(placeholder.as_str(), original);
        }
        result
    }
}

/// Masks markdown constructs in `text`.
pub fn protect(text: &str) -> Protected {
    let mut fragments: Vec<(String, String)> = Vec::new();
    let mut result = text.to_string();

    for (regex, kind) in PRESERVE_PATTERNS.iter() {
        result = regex
            .replace_all(&result, |caps: &regex::Captures| {
                let placeholder = format!("{}{}_{}__", PLACEHOLDER_PREFIX, fragments.len(), kind);
                fragments.push((placeholder.clone(), caps[0].to_string()));
                placeholder
            })
            .into_owned();
    }

    Protected {
        text: result,
        fragments,
    }
}
