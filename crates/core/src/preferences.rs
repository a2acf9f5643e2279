//! UI preferences persisted locally as key/value pairs.

use serde::{Deserialize, Serialize};

/// Storage key for the UI language.
pub const KEY_LANGUAGE: &str = "language";

/// Storage key for the design system.
pub const KEY_DESIGN_SYSTEM: &str = "designSystem";

/// Storage key for the color theme.
pub const KEY_THEME: &str = "theme";

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Supported UI languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
    Fr,
    Cs,
    Pl,
    Be,
    Uk,
    Kk,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::En,
        Language::De,
        Language::Fr,
        Language::Cs,
        Language::Pl,
        Language::Be,
        Language::Uk,
        Language::Kk,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::De => "de",
            Language::Fr => "fr",
            Language::Cs => "cs",
            Language::Pl => "pl",
            Language::Be => "be",
            Language::Uk => "uk",
            Language::Kk => "kk",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// Pick a language from a locale tag such as `de-AT` or `fr_FR.UTF-8`.
    ///
    /// Unsupported locales yield `None` so the caller can fall back.
    pub fn from_locale(locale: &str) -> Option<Self> {
        let primary = locale
            .split(['-', '_', '.'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::from_code(&primary)
    }
}

// ---------------------------------------------------------------------------
// Design system / theme
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignSystem {
    #[default]
    Default,
    Ios,
    Material,
}

impl DesignSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            DesignSystem::Default => "default",
            DesignSystem::Ios => "ios",
            DesignSystem::Material => "material",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "default" => Some(DesignSystem::Default),
            "ios" => Some(DesignSystem::Ios),
            "material" => Some(DesignSystem::Material),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            "system" => Some(Theme::System),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// The full set of locally persisted preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preferences {
    pub language: Language,
    pub design_system: DesignSystem,
    pub theme: Theme,
}

impl Preferences {
    /// Resolve preferences from stored raw values.
    ///
    /// A missing or unrecognised stored language falls back to the
    /// detected locale, then English. Other unrecognised values use
    /// their defaults.
    pub fn resolve(
        stored_language: Option<&str>,
        stored_design: Option<&str>,
        stored_theme: Option<&str>,
        locale: Option<&str>,
    ) -> Self {
        let language = stored_language
            .and_then(Language::from_code)
            .or_else(|| locale.and_then(Language::from_locale))
            .unwrap_or_default();
        Self {
            language,
            design_system: stored_design
                .and_then(DesignSystem::parse)
                .unwrap_or_default(),
            theme: stored_theme.and_then(Theme::parse).unwrap_or_default(),
        }
    }
}
