//! Phone canonicalization
//!
//! Both webhooks key contacts by the same id: E.164 digits without the
//! leading `+`, which is what WhatsApp puts in `messages[].from`.
//! A CRM form typed as `06 12 34 56 78` must land on the same contact as the
//! WhatsApp sender `33612345678`.

/// Length of a national number written with its trunk `0` (France: `0612345678`).
const NATIONAL_LENGTH: usize = 10;

/// Canonicalize a phone number. Returns `None` when no digits are left.
pub fn canonicalize(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let international_prefix = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return None;
    }

    // Country codes never start with 0.
    if international_prefix {
        return non_empty(digits.trim_start_matches('0'));
    }

    if let Some(rest) = digits.strip_prefix("00") {
        return non_empty(rest.trim_start_matches('0'));
    }

    if digits.len() == NATIONAL_LENGTH
        && let Some(national) = digits.strip_prefix('0')
    {
        return Some(format!("{}{}", default_country_code, national));
    }

    Some(digits)
}

fn non_empty(digits: &str) -> Option<String> {
    (!digits.is_empty()).then(|| digits.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("0612345678", "33612345678")]
    #[case("06 12 34 56 78", "33612345678")]
    #[case("06.12.34.56.78", "33612345678")]
    #[case("+33 6 12 34 56 78", "33612345678")]
    #[case("+33612345678", "33612345678")]
    #[case("0033612345678", "33612345678")]
    #[case("33612345678", "33612345678")]
    #[case("+32 470 12 34 56", "32470123456")]
    #[case("  +1 (415) 555-0100 ", "14155550100")]
    fn test_canonicalize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(canonicalize(raw, "33").as_deref(), Some(expected));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert_eq!(canonicalize("", "33"), None);
        assert_eq!(canonicalize("  ", "33"), None);
        assert_eq!(canonicalize("n/a", "33"), None);
        assert_eq!(canonicalize("00", "33"), None);
    }

    #[test]
    fn test_other_default_country() {
        assert_eq!(canonicalize("0470123456", "32").as_deref(), Some("32470123456"));
    }

    #[test]
    fn test_crm_and_whatsapp_forms_match() {
        let from_crm = canonicalize("0612345678", "33");
        let from_whatsapp = canonicalize("33612345678", "33");
        assert_eq!(from_crm, from_whatsapp);
    }

    proptest! {
        #[test]
        fn test_canonicalize_is_idempotent(raw in "[+]?[0-9 .-]{0,16}") {
            if let Some(once) = canonicalize(&raw, "33") {
                prop_assert_eq!(canonicalize(&once, "33"), Some(once.clone()));
                prop_assert!(once.chars().all(|c| c.is_ascii_digit()));
            }
        }
    }
}
