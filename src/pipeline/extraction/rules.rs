use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use super::{RuleHints, RuleMatcher, RuleOverrides};

/// One rule as written in `rules.json`.
#[derive(Debug, Clone, Deserialize)]
struct RuleDefinition {
    #[serde(default)]
    detect: Vec<String>,
    #[serde(default)]
    instructions: String,
    #[serde(default)]
    overrides: RuleOverrides,
}

#[derive(Debug, Clone)]
struct KeywordRule {
    id: String,
    keywords: Vec<String>,
    hints: RuleHints,
}

/// Keyword matcher backed by a JSON rules file, read on first use.
///
/// A rule matches when any of its `detect` keywords appears, ignoring case,
/// in the sender name or the raw document text. Rules are tried in id order.
pub struct KeywordRuleMatcher {
    path: PathBuf,
    rules: RwLock<Option<Arc<Vec<KeywordRule>>>>,
}

impl KeywordRuleMatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            rules: RwLock::new(None),
        }
    }

    /// Forget the cached rules; the file is read again on next match.
    pub fn reload(&self) {
        if let Ok(mut rules) = self.rules.write() {
            *rules = None;
        }
    }

    pub fn rule_count(&self) -> usize {
        self.loaded().len()
    }

    fn loaded(&self) -> Arc<Vec<KeywordRule>> {
        if let Ok(guard) = self.rules.read() {
            if let Some(rules) = guard.as_ref() {
                return Arc::clone(rules);
            }
        }
        let rules = Arc::new(load_rules(&self.path));
        if let Ok(mut guard) = self.rules.write() {
            *guard = Some(Arc::clone(&rules));
        }
        rules
    }
}

impl RuleMatcher for KeywordRuleMatcher {
    fn match_rule(&self, sender: &str, raw_text: Option<&str>) -> Option<RuleHints> {
        let sender = sender.to_lowercase();
        let text = raw_text.map(str::to_lowercase).unwrap_or_default();
        let rules = self.loaded();
        let rule = rules.iter().find(|rule| {
            rule.keywords
                .iter()
                .any(|k| sender.contains(k.as_str()) || text.contains(k.as_str()))
        })?;
        tracing::debug!(rule_id = %rule.id, "Rule matched");
        Some(rule.hints.clone())
    }
}

/// Missing, empty or malformed files yield no rules.
fn load_rules(path: &Path) -> Vec<KeywordRule> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No rules file");
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cannot read rules file");
            return Vec::new();
        }
    };
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let definitions: BTreeMap<String, RuleDefinition> = match serde_json::from_str(&raw) {
        Ok(defs) => defs,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Malformed rules file, ignoring it");
            return Vec::new();
        }
    };

    let rules: Vec<KeywordRule> = definitions
        .into_iter()
        .filter_map(|(id, def)| {
            let keywords: Vec<String> = def
                .detect
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                tracing::warn!(rule_id = %id, "Rule has no detect keywords, skipped");
                return None;
            }
            Some(KeywordRule {
                hints: RuleHints {
                    rule_id: id.clone(),
                    instructions: def.instructions,
                    overrides: def.overrides,
                },
                id,
                keywords,
            })
        })
        .collect();

    tracing::info!(path = %path.display(), rules = rules.len(), "Rules loaded");
    rules
}
