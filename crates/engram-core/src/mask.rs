//! Log-safe masking for secrets and phone numbers.
//!
//! Every log site that touches an API key or a chat/phone identifier goes
//! through these helpers. Message content itself is only logged at `debug!`.

/// Mask an API key as `<first4>…<last4>`.
///
/// Keys shorter than 9 chars are fully masked; showing both ends of a short
/// key would leak most of it.
pub fn mask_api_key(key: &str) -> String {
    if key.len() < 9 {
        return "****".to_string();
    }
    format!("{}\u{2026}{}", &key[..4], &key[key.len() - 4..])
}

/// Mask the middle digits of a phone-style identifier.
///
/// Non-digit characters (`+`, `@c.us` suffixes) pass through so the masked
/// form is still recognisable as the same kind of id.
pub fn mask_phone(phone: &str) -> String {
    let digit_count = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if digit_count <= 5 {
        return phone.chars().map(|c| if c.is_ascii_digit() { '*' } else { c }).collect();
    }
    let keep_head = 3;
    let keep_tail = 2;
    let mut seen = 0usize;
    phone
        .chars()
        .map(|c| {
            if !c.is_ascii_digit() {
                return c;
            }
            seen += 1;
            if seen <= keep_head || seen > digit_count - keep_tail {
                c
            } else {
                '*'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_keeps_ends_only() {
        assert_eq!(mask_api_key("sk-abcdefghijklmnop"), "sk-a\u{2026}mnop");
        assert_eq!(mask_api_key("short"), "****");
    }

    #[test]
    fn phone_masks_middle_digits() {
        let masked = mask_phone("+15550001234@c.us");
        assert!(masked.starts_with("+155"));
        assert!(masked.ends_with("34@c.us"));
        assert!(masked.contains('*'));
        // none of the middle digits survive
        assert!(!masked.contains("0001"));
    }

    #[test]
    fn short_numbers_are_fully_masked() {
        assert_eq!(mask_phone("12345"), "*****");
    }
}
