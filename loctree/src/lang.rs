//! Mapping between ISO language codes and the game's language folder names.

use unic_langid::LanguageIdentifier;

/// Folder names the game ships with, paired with their primary code.
const KNOWN: &[(&str, &str)] = &[
    ("English", "en"),
    ("Russian", "ru"),
    ("Japanese", "ja"),
    ("Korean", "ko"),
    ("French", "fr"),
    ("German", "de"),
    ("Spanish", "es"),
    ("SpanishLatin", "es-419"),
    ("Portuguese", "pt"),
    ("PortugueseBrazilian", "pt-BR"),
    ("Polish", "pl"),
    ("Italian", "it"),
    ("Turkish", "tr"),
    ("Ukrainian", "uk"),
    ("Czech", "cs"),
    ("Hungarian", "hu"),
    ("Dutch", "nl"),
    ("Romanian", "ro"),
    ("Thai", "th"),
    ("Greek", "el"),
    ("ChineseSimplified", "zh-Hans"),
    ("ChineseTraditional", "zh-Hant"),
];

/// Language folder name for an ISO code or an existing folder name.
///
/// Unknown codes fall back to their CamelCased form (`xx-yy` -> `XxYy`).
pub fn language_dir(input: &str) -> String {
    let input = input.trim();
    if let Some((dir, _)) = KNOWN.iter().find(|(dir, _)| dir.eq_ignore_ascii_case(input)) {
        return dir.to_string();
    }

    if let Ok(id) = input.replace('_', "-").parse::<LanguageIdentifier>() {
        let language = id.language.as_str();
        let region = id.region.as_ref().map(|r| r.as_str().to_ascii_uppercase());
        let script = id.script.as_ref().map(|s| s.as_str().to_string());
        let dir = match (language, region.as_deref(), script.as_deref()) {
            ("es", Some("ES"), _) | ("es", None, _) => Some("Spanish"),
            ("es", Some(_), _) => Some("SpanishLatin"),
            ("pt", Some("BR"), _) => Some("PortugueseBrazilian"),
            ("zh", _, Some("Hant")) | ("zh", Some("TW" | "HK" | "MO"), _) => Some("ChineseTraditional"),
            ("zh", _, _) => Some("ChineseSimplified"),
            _ => KNOWN
                .iter()
                .find(|(_, code)| *code == language)
                .map(|(dir, _)| *dir),
        };
        if let Some(dir) = dir {
            return dir.to_string();
        }
    }

    camel_case(input)
}

/// ISO code for a language folder name, if known.
pub fn language_code(dir: &str) -> Option<&'static str> {
    let base = dir.split(" (").next().unwrap_or(dir).trim();
    KNOWN
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(base))
        .map(|(_, code)| *code)
}

fn camel_case(input: &str) -> String {
    input
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Finds the folder for `name` below a `Languages` directory. The game also
/// accepts folders carrying a native name suffix, like `Russian (Русский)`.
pub fn find_language_dir(languages: &std::path::Path, name: &str) -> Option<std::path::PathBuf> {
    let exact = languages.join(name);
    if exact.is_dir() {
        return Some(exact);
    }
    let prefix = format!("{name} (");
    let mut candidates: Vec<_> = std::fs::read_dir(languages)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| e.path())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_language_dir_from_codes() {
        assert_eq!(language_dir("ru"), "Russian");
        assert_eq!(language_dir("ru-RU"), "Russian");
        assert_eq!(language_dir("pt_BR"), "PortugueseBrazilian");
        assert_eq!(language_dir("pt"), "Portuguese");
        assert_eq!(language_dir("es-MX"), "SpanishLatin");
        assert_eq!(language_dir("es"), "Spanish");
        assert_eq!(language_dir("zh-TW"), "ChineseTraditional");
        assert_eq!(language_dir("zh-CN"), "ChineseSimplified");
    }

    #[test]
    fn test_language_dir_passes_folder_names() {
        assert_eq!(language_dir("Russian"), "Russian");
        assert_eq!(language_dir("chinesesimplified"), "ChineseSimplified");
    }

    #[test]
    fn test_language_dir_fallback() {
        assert_eq!(language_dir("eo"), "Eo");
        assert_eq!(language_dir("xx-yy"), "XxYy");
    }

    #[test]
    fn test_language_code() {
        assert_eq!(language_code("Russian"), Some("ru"));
        assert_eq!(language_code("Russian (Русский)"), Some("ru"));
        assert_eq!(language_code("Klingon"), None);
    }

    #[test]
    fn test_find_language_dir_with_native_suffix() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Russian (Русский)")).unwrap();
        let found = find_language_dir(dir.path(), "Russian").unwrap();
        assert!(found.ends_with("Russian (Русский)"));
        assert!(find_language_dir(dir.path(), "German").is_none());
    }
}
