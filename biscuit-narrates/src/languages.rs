//! Language selectors, display names, flags, and preference keys.
//!
//! A [`LanguageSelector`] is what a caller picks ("US English", "Filipino", a
//! discovered `es-MX`); it always maps to exactly one concrete BCP-47
//! language code and one preference key under which the chosen voice is
//! persisted.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Preference key for the US English voice.
pub const US_PREFERENCE_KEY: &str = "voiceUS";
/// Preference key for the UK English voice.
pub const UK_PREFERENCE_KEY: &str = "voiceUK";
/// Preference key for the Filipino voice.
pub const FILIPINO_PREFERENCE_KEY: &str = "voiceFil";

/// Placeholder flag when no region can be derived.
pub const GLOBE_FLAG: &str = "\u{1F310}";

/// Product languages, surfaced before everything else in this order.
pub const PRIORITY_LANGUAGES: &[&str] = &["en-US", "en-GB", "fil-PH", "fil", "tl-PH", "tl"];

// ============================================================================
// Language Selector
// ============================================================================

/// The caller's choice of language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageSelector {
    /// English as spoken in the US (`en-US`).
    #[default]
    UsEnglish,
    /// English as spoken in the UK (`en-GB`).
    UkEnglish,
    /// Filipino (`fil-PH`).
    Filipino,
    /// Any other BCP-47 language code discovered from the voice catalog.
    Code(String),
}

impl LanguageSelector {
    /// Build a selector for a concrete language code, folding the product
    /// languages back onto their dedicated variants.
    pub fn from_code(code: &str) -> Self {
        match code {
            "en-US" => LanguageSelector::UsEnglish,
            "en-GB" => LanguageSelector::UkEnglish,
            "fil-PH" => LanguageSelector::Filipino,
            other => LanguageSelector::Code(other.to_string()),
        }
    }

    /// The concrete language code handed to the speech engine.
    pub fn language_code(&self) -> &str {
        match self {
            LanguageSelector::UsEnglish => "en-US",
            LanguageSelector::UkEnglish => "en-GB",
            LanguageSelector::Filipino => "fil-PH",
            LanguageSelector::Code(code) => code,
        }
    }

    /// The key under which this language's voice preference is stored.
    pub fn preference_key(&self) -> String {
        preference_key_for(self.language_code())
    }

    /// The identifier front ends use for this selector (`en_us_f`, `lang_es_MX`).
    pub fn id(&self) -> String {
        match self {
            LanguageSelector::UsEnglish => "en_us_f".into(),
            LanguageSelector::UkEnglish => "en_uk_m".into(),
            LanguageSelector::Filipino => "fil_f".into(),
            LanguageSelector::Code(code) => format!("lang_{}", sanitize(code)),
        }
    }
}

impl From<&str> for LanguageSelector {
    /// Parse a selector identifier. Unknown identifiers fall back to US English.
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "en_us_f" | "en" | "us" => LanguageSelector::UsEnglish,
            "en_uk_m" | "uk" => LanguageSelector::UkEnglish,
            "fil_f" | "fil" => LanguageSelector::Filipino,
            other => {
                if let Some(rest) = other.strip_prefix("lang_") {
                    return LanguageSelector::from_code(&rest.replace('_', "-"));
                }
                if looks_like_language_code(other) {
                    return LanguageSelector::from_code(other);
                }
                tracing::debug!(selector = other, "Unknown language selector, using en-US");
                LanguageSelector::UsEnglish
            }
        }
    }
}

impl fmt::Display for LanguageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&display_name(self.language_code()))
    }
}

fn looks_like_language_code(raw: &str) -> bool {
    let mut parts = raw.split('-');
    let Some(base) = parts.next() else {
        return false;
    };
    (2..=3).contains(&base.len())
        && base.chars().all(|c| c.is_ascii_lowercase())
        && parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn sanitize(code: &str) -> String {
    code.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// The preference key for a concrete language code.
///
/// `en-US`, `en-GB` and every Filipino/Tagalog code share the product's fixed
/// keys; everything else gets `voice_<code>` with separators replaced.
pub fn preference_key_for(language_code: &str) -> String {
    match language_code {
        "en-US" => US_PREFERENCE_KEY.into(),
        "en-GB" => UK_PREFERENCE_KEY.into(),
        code if code.starts_with("fil") || code.starts_with("tl") => {
            FILIPINO_PREFERENCE_KEY.into()
        }
        code => format!("voice_{}", sanitize(code)),
    }
}

/// The base language subtag (`en` for `en-US`).
pub fn base_language(language_code: &str) -> &str {
    language_code.split('-').next().unwrap_or(language_code)
}

fn region_subtag(language_code: &str) -> Option<&str> {
    language_code.split('-').nth(1).filter(|r| !r.is_empty())
}

// ============================================================================
// Display Names & Flags
// ============================================================================

static LANGUAGE_NAMES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("en-US", "English (US)"),
        ("en-GB", "English (UK)"),
        ("en-AU", "English (Australia)"),
        ("en-ZA", "English (South Africa)"),
        ("en-IE", "English (Ireland)"),
        ("en-CA", "English (Canada)"),
        ("en-NZ", "English (New Zealand)"),
        ("en-IN", "English (India)"),
        ("fil-PH", "Filipino"),
        ("fil", "Filipino"),
        ("tl-PH", "Tagalog"),
        ("tl", "Tagalog"),
        ("es-ES", "Spanish (Spain)"),
        ("es-MX", "Spanish (Mexico)"),
        ("es-US", "Spanish (US)"),
        ("es-AR", "Spanish (Argentina)"),
        ("fr-FR", "French (France)"),
        ("fr-CA", "French (Canada)"),
        ("de-DE", "German"),
        ("de-AT", "German (Austria)"),
        ("de-CH", "German (Switzerland)"),
        ("it-IT", "Italian"),
        ("pt-BR", "Portuguese (Brazil)"),
        ("pt-PT", "Portuguese (Portugal)"),
        ("ja-JP", "Japanese"),
        ("ko-KR", "Korean"),
        ("zh-CN", "Chinese (Simplified)"),
        ("zh-TW", "Chinese (Traditional)"),
        ("zh-HK", "Chinese (Hong Kong)"),
        ("ru-RU", "Russian"),
        ("ar-SA", "Arabic (Saudi)"),
        ("ar-EG", "Arabic (Egypt)"),
        ("hi-IN", "Hindi"),
        ("th-TH", "Thai"),
        ("vi-VN", "Vietnamese"),
        ("id-ID", "Indonesian"),
        ("ms-MY", "Malay"),
        ("tr-TR", "Turkish"),
        ("pl-PL", "Polish"),
        ("nl-NL", "Dutch"),
        ("nl-BE", "Dutch (Belgium)"),
        ("sv-SE", "Swedish"),
        ("da-DK", "Danish"),
        ("nb-NO", "Norwegian (Bokmål)"),
        ("fi-FI", "Finnish"),
        ("el-GR", "Greek"),
        ("cs-CZ", "Czech"),
        ("hu-HU", "Hungarian"),
        ("ro-RO", "Romanian"),
        ("uk-UA", "Ukrainian"),
        ("he-IL", "Hebrew"),
        ("bn-IN", "Bengali (India)"),
        ("ta-IN", "Tamil"),
        ("fa-IR", "Persian (Farsi)"),
    ])
});

static BASE_LANGUAGE_NAMES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("en", "English"),
        ("es", "Spanish"),
        ("fr", "French"),
        ("de", "German"),
        ("it", "Italian"),
        ("pt", "Portuguese"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("zh", "Chinese"),
        ("cmn", "Chinese"),
        ("ru", "Russian"),
        ("ar", "Arabic"),
        ("hi", "Hindi"),
        ("fil", "Filipino"),
        ("tl", "Filipino"),
        ("th", "Thai"),
        ("vi", "Vietnamese"),
        ("id", "Indonesian"),
        ("ms", "Malay"),
        ("tr", "Turkish"),
        ("pl", "Polish"),
        ("nl", "Dutch"),
        ("sv", "Swedish"),
        ("da", "Danish"),
        ("no", "Norwegian"),
        ("nb", "Norwegian"),
        ("fi", "Finnish"),
        ("el", "Greek"),
        ("cs", "Czech"),
        ("hu", "Hungarian"),
        ("ro", "Romanian"),
        ("uk", "Ukrainian"),
        ("he", "Hebrew"),
        ("bn", "Bengali"),
        ("ta", "Tamil"),
        ("fa", "Persian"),
        ("af", "Afrikaans"),
        ("sw", "Swahili"),
    ])
});

/// Human-readable name for a language code.
///
/// Exact table hit first, then `"<Base> (<REGION>)"`, then the bare code.
pub fn display_name(language_code: &str) -> String {
    if let Some(name) = LANGUAGE_NAMES.get(language_code) {
        return (*name).to_string();
    }

    match BASE_LANGUAGE_NAMES.get(base_language(language_code)) {
        Some(base) => match region_subtag(language_code) {
            Some(region) => format!("{base} ({})", region.to_uppercase()),
            None => (*base).to_string(),
        },
        None => language_code.to_string(),
    }
}

/// A flag hint for a language code.
///
/// Filipino and Tagalog carry the Philippine flag even without a region
/// subtag; otherwise a two-letter region becomes regional-indicator symbols.
pub fn flag_hint(language_code: &str) -> String {
    let base = base_language(language_code);
    if base == "fil" || base == "tl" {
        return "\u{1F1F5}\u{1F1ED}".to_string();
    }

    match region_subtag(language_code) {
        Some(region) if region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()) => {
            region
                .to_ascii_uppercase()
                .chars()
                .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
                .collect()
        }
        _ => GLOBE_FLAG.to_string(),
    }
}

/// Rank of a language among the product languages, `None` for the rest.
pub fn priority_rank(language_code: &str) -> Option<usize> {
    match language_code {
        "en-US" => Some(0),
        "en-GB" => Some(1),
        "fil-PH" | "fil" => Some(2),
        "tl-PH" | "tl" => Some(3),
        _ => None,
    }
}

/// Ordinal label for the voice at `index` within its language group.
///
/// `Voice A` … `Voice Z`, then `Voice AA`, `Voice AB`, …
pub fn voice_label(index: usize) -> String {
    let letter = |n: usize| char::from(b'A' + (n % 26) as u8);
    if index < 26 {
        format!("Voice {}", letter(index))
    } else {
        let rest = index - 26;
        format!("Voice {}{}", letter(rest / 26), letter(rest % 26))
    }
}

/// A short sample sentence suited to the language, for voice auditioning.
pub fn sample_sentence(language_code: &str) -> &'static str {
    let base = base_language(language_code);
    if base == "fil" || base == "tl" {
        "Kumusta, ito ay isang pagsubok ng boses."
    } else if language_code.contains("GB") || language_code.contains("UK") {
        "Hello, this is a British voice test."
    } else {
        "Hello, this is a voice test."
    }
}
