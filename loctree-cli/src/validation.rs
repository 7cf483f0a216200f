use std::path::Path;

use unic_langid::LanguageIdentifier;

/// Validation context for different command types
#[derive(Debug, Default)]
pub struct ValidationContext {
    pub root_dirs: Vec<String>,
    pub input_files: Vec<String>,
    pub output_path: Option<String>,
    pub languages: Vec<String>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.root_dirs.push(dir.as_ref().display().to_string());
        self
    }

    pub fn with_input_file(mut self, file: impl AsRef<Path>) -> Self {
        self.input_files.push(file.as_ref().display().to_string());
        self
    }

    pub fn with_output_path(mut self, path: impl AsRef<Path>) -> Self {
        self.output_path = Some(path.as_ref().display().to_string());
        self
    }

    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.languages.push(lang.into());
        self
    }
}

/// Validate file path exists and is readable
pub fn validate_file_path(path: &str) -> Result<(), String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return Err(format!("File does not exist: {}", path));
    }

    if !path_obj.is_file() {
        return Err(format!("Path is not a file: {}", path));
    }

    Ok(())
}

/// Validate a mod root directory
pub fn validate_root_dir(path: &str) -> Result<(), String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return Err(format!("Directory does not exist: {}", path));
    }

    if !path_obj.is_dir() {
        return Err(format!("Path is not a directory: {}", path));
    }

    Ok(())
}

/// Validate output location: the parent must exist or be creatable
pub fn validate_output_path(path: &str) -> Result<(), String> {
    let path_obj = Path::new(path);

    if let Some(parent) = path_obj.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        return Err(format!("Cannot create output directory: {}", e));
    }

    Ok(())
}

/// Validate a language argument. Accepts BCP 47 codes (`ru`, `pt-BR`) and
/// game folder names (`Russian`, `Russian (Русский)`).
pub fn validate_language(lang: &str) -> Result<(), String> {
    let lang = lang.trim();
    if lang.is_empty() {
        return Err("Language cannot be empty".to_string());
    }
    if lang.contains(['/', '\\']) || lang == "." || lang == ".." {
        return Err(format!("Invalid language: {}. Expected a code or folder name", lang));
    }
    if is_language_code(lang) {
        return Ok(());
    }
    if lang.chars().next().is_some_and(char::is_alphabetic) {
        return Ok(());
    }
    Err(format!(
        "Invalid language: {}. Expected a BCP 47 code or a language folder name",
        lang
    ))
}

/// True for short BCP 47 identifiers like `ru` or `zh-Hant`.
pub fn is_language_code(lang: &str) -> bool {
    match lang.replace('_', "-").parse::<LanguageIdentifier>() {
        Ok(id) => id.language.as_str().len() <= 3 && !id.language.is_empty(),
        Err(_) => false,
    }
}

/// Game folder name for a validated language argument.
pub fn language_folder(lang: &str) -> String {
    let lang = lang.trim();
    if is_language_code(lang) {
        loctree::lang::language_dir(lang)
    } else {
        lang.to_string()
    }
}

/// Validate a complete validation context
pub fn validate_context(context: &ValidationContext) -> Result<(), String> {
    for root in &context.root_dirs {
        validate_root_dir(root).map_err(|e| format!("Root validation failed: {}", e))?;
    }

    for (i, input) in context.input_files.iter().enumerate() {
        validate_file_path(input)
            .map_err(|e| format!("Input file {} validation failed: {}", i + 1, e))?;
    }

    if let Some(ref output) = context.output_path {
        validate_output_path(output).map_err(|e| format!("Output validation failed: {}", e))?;
    }

    for lang in &context.languages {
        validate_language(lang).map_err(|e| format!("Language validation failed: {}", e))?;
    }

    Ok(())
}
