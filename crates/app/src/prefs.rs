//! Locally persisted UI preferences.
//!
//! A flat JSON object of string values, read once at startup and
//! rewritten whenever a value changes.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use keepmd_core::preferences::{Preferences, KEY_DESIGN_SYSTEM, KEY_LANGUAGE, KEY_THEME};

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("Preference file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Preference file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Key/value preference store backed by one JSON file.
#[derive(Debug)]
pub struct PreferenceFile {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl PreferenceFile {
    /// Read `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PrefsError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set `key` and write the file if the value changed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PrefsError> {
        if self.get(key) == Some(value) {
            return Ok(());
        }
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }

    /// Resolve stored values, falling back to `locale` for the language.
    pub fn preferences(&self, locale: Option<&str>) -> Preferences {
        Preferences::resolve(
            self.get(KEY_LANGUAGE),
            self.get(KEY_DESIGN_SYSTEM),
            self.get(KEY_THEME),
            locale,
        )
    }

    /// Persist every field of `prefs`.
    pub fn store(&mut self, prefs: &Preferences) -> Result<(), PrefsError> {
        self.set(KEY_LANGUAGE, prefs.language.code())?;
        self.set(KEY_DESIGN_SYSTEM, prefs.design_system.as_str())?;
        self.set(KEY_THEME, prefs.theme.as_str())
    }

    fn save(&self) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        tracing::debug!(path = %self.path.display(), "Preferences saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use keepmd_core::preferences::{Language, Theme};

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PreferenceFile::load(dir.path().join("nope.json")).unwrap();
        assert!(prefs.get(KEY_THEME).is_none());
    }

    #[test]
    fn values_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/prefs.json");

        let mut prefs = PreferenceFile::load(&path).unwrap();
        prefs.set(KEY_THEME, "dark").unwrap();
        prefs.set(KEY_LANGUAGE, "cs").unwrap();

        let reloaded = PreferenceFile::load(&path).unwrap();
        let resolved = reloaded.preferences(Some("de-DE"));
        assert_eq!(resolved.theme, Theme::Dark);
        assert_eq!(resolved.language, Language::Cs);
    }

    #[test]
    fn store_writes_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = PreferenceFile::load(&path).unwrap();
        let resolved = prefs.preferences(Some("kk-KZ"));
        prefs.store(&resolved).unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get(KEY_LANGUAGE).map(String::as_str), Some("kk"));
        assert_eq!(raw.get(KEY_THEME).map(String::as_str), Some("system"));
        assert_eq!(raw.get(KEY_DESIGN_SYSTEM).map(String::as_str), Some("default"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{not json").unwrap();
        assert_matches!(PreferenceFile::load(&path), Err(PrefsError::Parse(_)));
    }
}
