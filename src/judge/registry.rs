use crate::config::types::{FdscopeError, Language, Result};
use crate::judge::adapter::LanguageAdapter;
use crate::judge::languages::{c::CAdapter, python::PythonAdapter};
use std::path::Path;

pub fn adapter_for(language: Language) -> Box<dyn LanguageAdapter> {
    match language {
        Language::Python => Box::new(PythonAdapter),
        Language::C => Box::new(CAdapter),
    }
}

/// Language from an explicit name, else from the source file extension
pub fn detect_language(source: &Path, explicit: Option<&str>) -> Result<Language> {
    if let Some(name) = explicit {
        return name.parse();
    }

    source
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_extension)
        .ok_or_else(|| {
            FdscopeError::Config(format!(
                "cannot infer language of {}; use a .py or .c file or pass --language",
                source.display()
            ))
        })
}
