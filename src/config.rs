use std::time::Duration;

use clap::ValueEnum;

/// Trigger literal that precedes a reference code in document text.
pub const DEFAULT_TRIGGER: &str = "Ref:";

/// URL prefix under which indexed documents are served.
pub const DEFAULT_LINK_PREFIX: &str = "/static/pdfs";

pub const DEFAULT_DPI: u32 = 300;
pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(60);

/// Month-name table and OCR language for a document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Locale {
    #[default]
    Es,
    En,
}

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

const MONTHS_EN: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

impl Locale {
    /// Lower-case month names, January first.
    pub fn month_names(self) -> &'static [&'static str; 12] {
        match self {
            Locale::Es => &MONTHS_ES,
            Locale::En => &MONTHS_EN,
        }
    }

    /// Tesseract language code for this locale.
    pub fn ocr_language(self) -> &'static str {
        match self {
            Locale::Es => "spa",
            Locale::En => "eng",
        }
    }
}

/// Grammar of the code run that follows the trigger literal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CodeGrammar {
    /// Letters, digits and hyphens.
    Strict,
    /// Everything on the same line up to the next `/`.
    #[default]
    UntilSlash,
    /// A caller-supplied regex; capture group 1 is the code.
    Custom(String),
}

/// Order of the digits in a numeric filename date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NumericOrder {
    /// `032025`
    #[default]
    MonthYear,
    /// `202503`
    YearMonth,
}

/// When to fall back to OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OcrMode {
    /// OCR each page whose native text lacks the trigger.
    #[default]
    PerPage,
    /// OCR every page, but only when no page's native text has the trigger.
    Document,
    /// Native text layer only.
    Off,
}

/// Everything that parameterizes an index build.
#[derive(Debug, Clone)]
pub struct Settings {
    pub trigger: String,
    pub grammar: CodeGrammar,
    pub locale: Locale,
    pub numeric_order: NumericOrder,
    pub ocr_mode: OcrMode,
    /// Overrides the locale's OCR language when set.
    pub ocr_language: Option<String>,
    pub dpi: u32,
    pub ocr_timeout: Duration,
    pub workers: usize,
    pub link_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER.to_string(),
            grammar: CodeGrammar::default(),
            locale: Locale::default(),
            numeric_order: NumericOrder::default(),
            ocr_mode: OcrMode::default(),
            ocr_language: None,
            dpi: DEFAULT_DPI,
            ocr_timeout: DEFAULT_OCR_TIMEOUT,
            workers: default_workers(),
            link_prefix: DEFAULT_LINK_PREFIX.to_string(),
        }
    }
}

impl Settings {
    pub fn ocr_language(&self) -> &str {
        self.ocr_language
            .as_deref()
            .unwrap_or_else(|| self.locale.ocr_language())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_source_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.trigger, "Ref:");
        assert_eq!(settings.grammar, CodeGrammar::UntilSlash);
        assert_eq!(settings.locale, Locale::Es);
        assert_eq!(settings.ocr_language(), "spa");
        assert_eq!(settings.ocr_mode, OcrMode::PerPage);
        assert!(settings.workers >= 1);
    }

    #[test]
    fn explicit_ocr_language_wins() {
        let settings = Settings {
            locale: Locale::En,
            ocr_language: Some("spa+eng".to_string()),
            ..Settings::default()
        };
        assert_eq!(settings.ocr_language(), "spa+eng");
    }

    #[test]
    fn month_tables_start_in_january() {
        assert_eq!(Locale::Es.month_names()[0], "enero");
        assert_eq!(Locale::En.month_names()[11], "december");
    }
}
