//! File-extension to language rules and canonical spelling of names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::types::UserId;

/// A user-defined rule assigning a language to files with a given extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageMapping {
    pub id: i64,
    pub user_id: UserId,
    /// Extension without the leading dot, may itself contain dots (`blade.php`).
    pub extension: String,
    pub language: String,
}

/// Resolved extension rules for one user: server-wide rules overridden by the
/// user's own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageRules {
    rules: BTreeMap<String, String>,
}

impl LanguageRules {
    /// Builds rules from server defaults plus user mappings. User mappings win.
    pub fn resolve<'a>(
        server: impl IntoIterator<Item = (&'a String, &'a String)>,
        user: &[LanguageMapping],
    ) -> Self {
        let mut rules = BTreeMap::new();
        for (extension, language) in server {
            rules.insert(normalize_extension(extension), language.clone());
        }
        for mapping in user {
            rules.insert(normalize_extension(&mapping.extension), mapping.language.clone());
        }
        rules.retain(|extension, _| !extension.is_empty());
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Language for the given entity path, if any rule matches.
    /// The longest matching extension wins, so `blade.php` beats `php`.
    pub fn language_for(&self, entity: &str) -> Option<&str> {
        self.rules
            .iter()
            .filter(|(extension, _)| {
                entity.len() > extension.len()
                    && entity.ends_with(extension.as_str())
                    && entity.as_bytes()[entity.len() - extension.len() - 1] == b'.'
            })
            .max_by_key(|(extension, _)| extension.len())
            .map(|(_, language)| language.as_str())
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_string()
}

const CANONICAL_LANGUAGES: &[(&str, &str)] = &[
    ("c", "C"),
    ("cpp", "C++"),
    ("c++", "C++"),
    ("c#", "C#"),
    ("csharp", "C#"),
    ("css", "CSS"),
    ("go", "Go"),
    ("html", "HTML"),
    ("java", "Java"),
    ("javascript", "JavaScript"),
    ("json", "JSON"),
    ("jsx", "JSX"),
    ("kotlin", "Kotlin"),
    ("markdown", "Markdown"),
    ("php", "PHP"),
    ("python", "Python"),
    ("ruby", "Ruby"),
    ("rust", "Rust"),
    ("scss", "SCSS"),
    ("sql", "SQL"),
    ("tsx", "TSX"),
    ("typescript", "TypeScript"),
    ("vue", "Vue.js"),
    ("vuejs", "Vue.js"),
    ("yaml", "YAML"),
];

/// Canonical spelling for system-wide names that plugins send with
/// inconsistent casing (`JAVA`, `java`). Only languages, editors and operating
/// systems are normalized; other values pass through untouched.
pub fn canonical_name(value: &str, entity_type: EntityType) -> String {
    if value.is_empty() {
        return String::new();
    }
    match entity_type {
        EntityType::Language => {
            let lookup = lookup_key(value);
            CANONICAL_LANGUAGES
                .iter()
                .find(|(key, _)| *key == lookup)
                .map_or_else(|| capitalize(value), |(_, name)| (*name).to_string())
        }
        EntityType::Editor | EntityType::OperatingSystem => capitalize(value),
        _ => value.to_string(),
    }
}

fn lookup_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '#')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Uppercases the first character, leaving the rest as sent.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(extension: &str, language: &str) -> LanguageMapping {
        LanguageMapping {
            id: 0,
            user_id: UserId::new("alice").unwrap(),
            extension: extension.to_string(),
            language: language.to_string(),
        }
    }

    #[test]
    fn most_specific_extension_wins() {
        let rules = LanguageRules::resolve(
            std::iter::empty(),
            &[
                mapping("py", "Python3"),
                mapping("php", "PHP 8"),
                mapping("blade.php", "Blade"),
            ],
        );
        assert_eq!(rules.language_for("~/dev/file.py"), Some("Python3"));
        assert_eq!(rules.language_for("~/dev/file.blade.php"), Some("Blade"));
        assert_eq!(rules.language_for("~/dev/file.php"), Some("PHP 8"));
        assert_eq!(rules.language_for("~/dev/filephp"), None);
    }

    #[test]
    fn user_mappings_override_server_defaults() {
        let server: BTreeMap<String, String> =
            [("py".to_string(), "Python".to_string())].into_iter().collect();
        let rules = LanguageRules::resolve(&server, &[mapping(".py", "Python3")]);
        assert_eq!(rules.language_for("main.py"), Some("Python3"));
    }

    #[test]
    fn canonical_language_names() {
        assert_eq!(canonical_name("JAVA", EntityType::Language), "Java");
        assert_eq!(canonical_name("typescript", EntityType::Language), "TypeScript");
        assert_eq!(canonical_name("elixir", EntityType::Language), "Elixir");
        assert_eq!(canonical_name("vscode", EntityType::Editor), "Vscode");
        assert_eq!(canonical_name("my-project", EntityType::Project), "my-project");
        assert_eq!(canonical_name("", EntityType::Language), "");
    }
}
