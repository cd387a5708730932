use regex::Regex;
use std::sync::OnceLock;

/// Letters that only occur in Persian text (keheh, gaf, pe, che, Farsi yeh, Persian digits...).
fn persian_letters() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\u{06A9}\u{06AF}\u{06C0}\u{06CC}\u{067E}\u{0686}\u{06F0}-\u{06F9}]")
            .expect("static regex")
    })
}

/// Hebrew, Arabic, Syriac, Thaana and the Arabic presentation forms.
fn rtl_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\u{0591}-\u{07FF}\u{FB1D}-\u{FDFD}\u{FE70}-\u{FEFC}]").expect("static regex")
    })
}

const RTL_RATIO_THRESHOLD: f64 = 0.2;

/// Decides whether `text` should be rendered right-to-left.
///
/// Any Persian-specific letter is enough on its own. Otherwise the share of
/// right-to-left characters must exceed 20% of all characters.
pub fn is_rtl(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if persian_letters().is_match(text) {
        return true;
    }

    let rtl = rtl_chars().find_iter(text).count();
    if rtl == 0 {
        return false;
    }
    let total = text.chars().count();
    (rtl as f64 / total as f64) > RTL_RATIO_THRESHOLD
}

/// CSS-style direction keyword for `text`.
pub fn direction_of(text: &str) -> &'static str {
    if is_rtl(text) {
        "rtl"
    } else {
        "ltr"
    }
}
