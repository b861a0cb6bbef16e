// Localized text resolution with locale fallback and `${param}` substitution.

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Locale code -> template, e.g. `{"en": "Tank buster on ${target}"}`.
pub type LocaleText = BTreeMap<String, String>;

/// Symbolic key -> per-locale templates, declared by a trigger.
pub type OutputStrings = HashMap<String, LocaleText>;

pub const DEFAULT_LOCALE: &str = "en";

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\$\{\s*([A-Za-z0-9_]+)\s*\}").expect("Invalid placeholder regex");
}

/// What a trigger asks to display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSpec {
    /// Symbolic key into the trigger's output strings
    Key(String),
    /// Inline per-locale templates
    Localized(LocaleText),
    /// Text used as-is in every locale
    Literal(String),
}

impl TextSpec {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Build inline templates from `(locale, template)` pairs.
    pub fn localized<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::Localized(
            pairs
                .into_iter()
                .map(|(locale, text)| (locale.to_string(), text.to_string()))
                .collect(),
        )
    }
}

/// Resolves text specs into display strings for the active locale.
#[derive(Debug, Clone)]
pub struct OutputResolver {
    locale: String,
    default_locale: String,
}

impl Default for OutputResolver {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE, DEFAULT_LOCALE)
    }
}

impl OutputResolver {
    pub fn new(locale: impl Into<String>, default_locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            default_locale: default_locale.into(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Resolve a spec to a literal string. Never fails: a missing translation
    /// falls back to the default locale, then to the symbolic key itself.
    pub fn resolve(
        &self,
        spec: &TextSpec,
        strings: &OutputStrings,
        params: &HashMap<String, String>,
    ) -> String {
        let template = match spec {
            TextSpec::Literal(text) => text.clone(),
            TextSpec::Key(key) => strings
                .get(key)
                .and_then(|text| self.pick(text))
                .unwrap_or_else(|| key.clone()),
            TextSpec::Localized(text) => self
                .pick(text)
                .or_else(|| text.values().next().cloned())
                .unwrap_or_default(),
        };
        substitute(&template, params)
    }

    fn pick(&self, text: &LocaleText) -> Option<String> {
        text.get(&self.locale)
            .or_else(|| text.get(&self.default_locale))
            .cloned()
    }
}

/// Fill `${name}` placeholders; unknown names stay as literal text.
pub fn substitute(template: &str, params: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings() -> OutputStrings {
        let mut strings = OutputStrings::new();
        strings.insert(
            "tankBuster".to_string(),
            [
                ("en".to_string(), "Tank buster on ${target}".to_string()),
                ("de".to_string(), "Tankbuster auf ${target}".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        strings.insert(
            "englishOnly".to_string(),
            [("en".to_string(), "Spread".to_string())].into_iter().collect(),
        );
        strings
    }

    fn params() -> HashMap<String, String> {
        [("target".to_string(), "Tank Player".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_exact_locale_wins() {
        let resolver = OutputResolver::new("de", "en");
        let text = resolver.resolve(&TextSpec::key("tankBuster"), &strings(), &params());
        assert_eq!(text, "Tankbuster auf Tank Player");
    }

    #[test]
    fn test_falls_back_to_default_locale() {
        let resolver = OutputResolver::new("de", "en");
        let text = resolver.resolve(&TextSpec::key("englishOnly"), &strings(), &params());
        assert_eq!(text, "Spread");
    }

    #[test]
    fn test_missing_key_renders_key_name() {
        let resolver = OutputResolver::new("fr", "en");
        let text = resolver.resolve(&TextSpec::key("noSuchKey"), &strings(), &params());
        assert_eq!(text, "noSuchKey");
    }

    #[test]
    fn test_unresolved_placeholder_left_literal() {
        let resolver = OutputResolver::default();
        let spec = TextSpec::literal("${target} then ${ unknown }");
        let text = resolver.resolve(&spec, &OutputStrings::new(), &params());
        assert_eq!(text, "Tank Player then ${ unknown }");
    }

    #[test]
    fn test_localized_without_default_uses_any_translation() {
        let resolver = OutputResolver::new("de", "en");
        let spec = TextSpec::localized([("ja", "散開")]);
        assert_eq!(resolver.resolve(&spec, &OutputStrings::new(), &params()), "散開");
    }
}
