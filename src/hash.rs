//! Content hashing for response identity across successive captures.

use chrono::NaiveDateTime;

/// UTF-16 code units of body text folded into a content hash.
pub const HASH_TEXT_LIMIT: usize = 200;

const SEED: u32 = 5381;

/// DJB2-xor over UTF-16 code units, rendered in base 36.
pub fn simple_hash(input: &str) -> String {
    to_base36(fold_units(input.encode_utf16()))
}

/// Hash of an ISO-formatted timestamp plus the first [`HASH_TEXT_LIMIT`]
/// UTF-16 code units of the response text. The cut may fall inside a
/// surrogate pair; the lone half is hashed as-is.
pub fn content_hash(text: &str, timestamp: &NaiveDateTime) -> String {
    let prefix = format!("{}:", timestamp.format("%Y-%m-%dT%H:%M:%S%.3f"));
    let units = prefix
        .encode_utf16()
        .chain(text.encode_utf16().take(HASH_TEXT_LIMIT));
    to_base36(fold_units(units))
}

fn fold_units(units: impl Iterator<Item = u16>) -> u32 {
    units.fold(SEED, |hash, unit| hash.wrapping_mul(33) ^ u32::from(unit))
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn empty_string_hashes_to_seed() {
        // 5381 in base 36
        assert_eq!(simple_hash(""), "45h");
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(simple_hash("本文"), simple_hash("本文"));
        assert_ne!(simple_hash("本文"), simple_hash("本文!"));
    }

    #[test]
    fn base36_digits_only() {
        let h = simple_hash("the quick brown fox");
        assert!(h.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn content_hash_ignores_text_past_limit() {
        let base = "a".repeat(HASH_TEXT_LIMIT);
        let longer = format!("{base}tail that does not count");
        assert_eq!(content_hash(&base, &ts()), content_hash(&longer, &ts()));
    }

    #[test]
    fn limit_counts_utf16_units() {
        // 100 astral characters fill the 200-unit window.
        let full = "😀".repeat(100);
        let longer = "😀".repeat(150);
        assert_eq!(content_hash(&full, &ts()), content_hash(&longer, &ts()));

        let base = "a".repeat(HASH_TEXT_LIMIT - 1);
        assert_eq!(
            content_hash(&format!("{base}😀"), &ts()),
            content_hash(&format!("{base}😀tail"), &ts())
        );
        assert_ne!(
            content_hash(&format!("{base}😀"), &ts()),
            content_hash(&format!("{base}b"), &ts())
        );
    }

    #[test]
    fn content_hash_matches_plain_hash_of_short_text() {
        let expected = simple_hash("2024-11-02T12:00:00.000:本文");
        assert_eq!(content_hash("本文", &ts()), expected);
    }

    #[test]
    fn content_hash_depends_on_timestamp() {
        let later = ts() + chrono::Duration::seconds(1);
        assert_ne!(content_hash("same", &ts()), content_hash("same", &later));
    }
}
