// 🔤 Name Normalizer - Canonical keys for entity comparison
// Collapses the many spellings of one real-world entity ("XYZ Pvt. Ltd.",
// "XYZ PRIVATE LIMITED") onto a single comparable form, and reduces
// registered-office addresses to clusterable keys (pincode + city tokens).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Corporate suffix tokens stripped before comparison. These carry no
/// identity signal and differ wildly across sources ("Pvt Ltd" vs
/// "Private Limited" vs "P. Ltd.").
pub const CORPORATE_SUFFIXES: &[&str] = &[
    "private",
    "limited",
    "pvt",
    "ltd",
    "llp",
    "opc",
    "inc",
    "corp",
    "company",
    "enterprises",
    "group",
    "foundation",
    "trust",
];

/// Substrings scrubbed out of addresses before signature tokens are taken.
const ADDRESS_NOISE: &[&str] = &["india", "c/o", "s/o", "d/o", "w/o", "near", "opp", "behind"];

/// Indian 6-digit PIN code.
static PINCODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{6})\b").expect("pincode regex"));

/// Runs of lowercase letters (address signature tokens).
static ALPHA_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]+").expect("alpha-run regex"));

// ============================================================================
// NORMALIZED NAME
// ============================================================================

/// A name reduced to its comparable form plus its significant tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedName {
    pub raw: String,
    pub normalized: String,
    pub tokens: HashSet<String>,
}

impl NormalizedName {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Normalize a raw entity name into a `NormalizedName`.
///
/// Empty or all-punctuation input yields an empty normalized string and an
/// empty token set; this is never an error.
pub fn normalize(raw: &str) -> NormalizedName {
    let normalized = normalize_name(raw);
    let tokens = tokenize(&normalized);
    NormalizedName {
        raw: raw.to_string(),
        normalized,
        tokens,
    }
}

/// Lowercase, map punctuation to spaces, drop corporate suffix words,
/// collapse whitespace.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| !CORPORATE_SUFFIXES.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Significant tokens of a normalized name: whitespace-split words longer
/// than one character.
pub fn tokenize(normalized: &str) -> HashSet<String> {
    normalized
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets: |intersection| / |union|.
/// Either set empty yields 0.0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

// ============================================================================
// ADDRESS KEYS
// ============================================================================

/// Reduce a registered-office address to a clusterable key:
/// `pincode + "|" + up to 5 sorted signature tokens (length > 3)`.
///
/// Returns `None` when the address yields neither a pincode nor any
/// signature token, so blank addresses never collapse into one giant
/// cluster.
pub fn address_key(raw: &str) -> Option<String> {
    let lowered = raw.to_lowercase();
    let trimmed = lowered.trim();
    if trimmed.is_empty() {
        return None;
    }

    let pincode = PINCODE_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut scrubbed = trimmed.to_string();
    for noise in ADDRESS_NOISE {
        scrubbed = scrubbed.replace(noise, "");
    }

    let mut sig_tokens: Vec<String> = ALPHA_RUN_RE
        .find_iter(&scrubbed)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.len() > 3)
        .collect();
    sig_tokens.sort();
    sig_tokens.dedup();

    if pincode.is_empty() && sig_tokens.is_empty() {
        return None;
    }

    let signature = sig_tokens
        .into_iter()
        .take(5)
        .collect::<Vec<_>>()
        .join(",");
    Some(format!("{}|{}", pincode, signature))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_of(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_normalize_strips_corporate_suffixes() {
        assert_eq!(normalize_name("XYZ Pvt. Ltd."), "xyz");
        assert_eq!(normalize_name("XYZ Private Limited"), "xyz");
        assert_eq!(
            normalize_name("Apex Infra Projects (OPC) Private Limited"),
            "apex infra projects"
        );

        // Two spellings of the same entity collapse onto one form
        let a = normalize("XYZ Pvt. Ltd.");
        let b = normalize("XYZ Private Limited");
        assert_eq!(a.normalized, b.normalized);
        assert_eq!(a.normalized, "xyz");

        println!("✅ Suffix stripping test passed");
    }

    #[test]
    fn test_normalize_keeps_embedded_words() {
        // "pvtltd" has no word boundary, so nothing is stripped
        assert_eq!(normalize_name("Acme pvtltd"), "acme pvtltd");
        // Digits survive
        assert_eq!(normalize_name("Sector-21 Traders"), "sector 21 traders");
    }

    #[test]
    fn test_normalize_empty_and_punctuation_input() {
        let empty = normalize("");
        assert_eq!(empty.normalized, "");
        assert!(empty.tokens.is_empty());
        assert!(empty.is_empty());

        let punct = normalize("?!...###");
        assert_eq!(punct.normalized, "");
        assert!(punct.tokens.is_empty());

        println!("✅ Empty input yields empty result, never an error");
    }

    #[test]
    fn test_tokenize_drops_single_characters() {
        let tokens = tokenize("a bc def x 42");
        assert_eq!(tokens, tokens_of(&["bc", "def", "42"]));
    }

    #[test]
    fn test_jaccard_similarity() {
        let a = tokens_of(&["alpha", "beta"]);
        let b = tokens_of(&["beta", "gamma"]);
        let same = tokens_of(&["alpha", "beta"]);
        let empty: HashSet<String> = HashSet::new();

        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard(&a, &same), 1.0);
        assert_eq!(jaccard(&a, &empty), 0.0);
        assert_eq!(jaccard(&empty, &empty), 0.0);
        assert_eq!(jaccard(&a, &tokens_of(&["delta"])), 0.0);
    }

    #[test]
    fn test_address_key_extracts_pincode_and_tokens() {
        let key = address_key("Plot 12, Industrial Area, Phase II, New Delhi 110020, India");
        assert_eq!(
            key.as_deref(),
            Some("110020|area,delhi,industrial,phase,plot")
        );

        // Same premises written differently lands on the same key
        let other = address_key("INDUSTRIAL AREA PHASE-II, PLOT 12, NEW DELHI - 110020");
        assert_eq!(key, other);

        println!("✅ Address key test passed: {:?}", key);
    }

    #[test]
    fn test_address_key_without_pincode() {
        let key = address_key("Mahatma Gandhi Road, Kanpur");
        assert_eq!(key.as_deref(), Some("|gandhi,kanpur,mahatma,road"));
    }

    #[test]
    fn test_address_key_degenerate_inputs() {
        assert_eq!(address_key(""), None);
        assert_eq!(address_key("   "), None);
        // Nothing longer than 3 letters and no pincode
        assert_eq!(address_key("12 A St"), None);
    }

    #[test]
    fn test_address_key_caps_signature_at_five_tokens() {
        let key = address_key(
            "Ganga Yamuna Saraswati Narmada Godavari Kaveri Bhavan 400001",
        )
        .unwrap();
        let parts: Vec<&str> = key.splitn(2, '|').collect();
        assert_eq!(parts[0], "400001");
        assert_eq!(parts[1].split(',').count(), 5);
    }
}
