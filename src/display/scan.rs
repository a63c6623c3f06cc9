//! Normalization and classification of raw scanner input.
//!
//! Kiosk scanners act as keyboards and hand over whatever was encoded in
//! the barcode: sometimes the bare code, sometimes a claim URL wrapping
//! it. Everything funnels through [`normalize_scan`] before the display
//! decides what to do.

use reqwest::Url;

use crate::dto::validation::{
    CARD_CODE_PREFIX, PACK_CODE_PREFIX, validate_card_code, validate_pack_code,
};

/// What a normalized scan turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Pack-activation code (`tkp_` prefix): starts a session.
    Pack,
    /// Card-identification code (`tkc_` prefix): resolves the pulled card.
    Card,
    /// Anything else; the display shows a hint instead of acting.
    Unknown,
}

/// Extract the canonical code from raw scanner text.
///
/// Strategy, in order: find a code-shaped token (`tkp_`/`tkc_` prefix plus
/// alphanumeric body, case-insensitive) anywhere in the string and
/// normalize it to lowercase; else, if the text parses as a URL, take the
/// final non-empty path segment; else return the trimmed text unchanged.
/// Whitespace-only input normalizes to the empty string.
pub fn normalize_scan(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lower = trimmed.to_lowercase();
    if let Some(token) = find_code_token(&lower) {
        return token;
    }

    if let Ok(url) = Url::parse(trimmed) {
        if let Some(last) = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        {
            return last.to_lowercase();
        }
    }

    trimmed.to_string()
}

/// Classify a normalized code by its prefix convention.
pub fn classify(code: &str) -> ScanKind {
    if validate_pack_code(code).is_ok() {
        ScanKind::Pack
    } else if validate_card_code(code).is_ok() {
        ScanKind::Card
    } else {
        ScanKind::Unknown
    }
}

/// Locate a prefixed alphanumeric token anywhere in the lowercased input.
fn find_code_token(lower: &str) -> Option<String> {
    for prefix in [PACK_CODE_PREFIX, CARD_CODE_PREFIX] {
        if let Some(start) = lower.find(prefix) {
            let body: String = lower[start + prefix.len()..]
                .chars()
                .take_while(char::is_ascii_alphanumeric)
                .collect();
            if !body.is_empty() {
                return Some(format!("{prefix}{body}"));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_code_is_trimmed_and_lowercased() {
        assert_eq!(normalize_scan("  TKC_AB12  "), "tkc_ab12");
        assert_eq!(normalize_scan("tkp_0001"), "tkp_0001");
    }

    #[test]
    fn code_embedded_in_url_is_extracted() {
        assert_eq!(normalize_scan("https://x/claim/tkc_ab12"), "tkc_ab12");
        assert_eq!(
            normalize_scan("https://rips.example/claim/TKP_77AB?src=qr"),
            "tkp_77ab"
        );
    }

    #[test]
    fn url_without_code_token_falls_back_to_last_segment() {
        assert_eq!(
            normalize_scan("https://rips.example/claim/ABC123/"),
            "abc123"
        );
    }

    #[test]
    fn empty_and_whitespace_normalize_to_empty() {
        assert_eq!(normalize_scan(""), "");
        assert_eq!(normalize_scan("   \t "), "");
    }

    #[test]
    fn non_code_text_passes_through_trimmed() {
        assert_eq!(normalize_scan("  hello world  "), "hello world");
    }

    #[test]
    fn token_with_empty_body_is_not_a_code() {
        // `tkp_` with nothing behind it should not be picked up as a token.
        assert_eq!(normalize_scan("tkp_"), "tkp_");
        assert_eq!(classify("tkp_"), ScanKind::Unknown);
    }

    #[test]
    fn classification_follows_prefix() {
        assert_eq!(classify("tkp_0001"), ScanKind::Pack);
        assert_eq!(classify("tkc_ab12"), ScanKind::Card);
        assert_eq!(classify("abc123"), ScanKind::Unknown);
        assert_eq!(classify(""), ScanKind::Unknown);
    }
}
