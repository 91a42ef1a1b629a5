//! Mod-10 check digit validation for 16-digit card numbers

/// Length of every card number this crate accepts.
pub const CARD_NUMBER_LEN: usize = 16;

/// Expected check digit for a 15-digit payload.
///
/// Walks the payload right to left, doubling digits at even positions of that
/// walk (subtracting 9 when the double exceeds 9), and closes with
/// `(sum * 9) % 10`.
pub fn check_digit(payload: &str) -> Option<u8> {
    if payload.len() != CARD_NUMBER_LEN - 1 || !payload.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let sum: u32 = payload
        .bytes()
        .rev()
        .map(|b| u32::from(b - b'0'))
        .enumerate()
        .map(|(position, digit)| {
            if position % 2 == 0 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();

    Some(((sum * 9) % 10) as u8)
}

/// True iff `digits` is exactly 16 decimal digits with a matching check digit.
pub fn is_valid(digits: &str) -> bool {
    if digits.len() != CARD_NUMBER_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    // All ASCII from here on, so byte offsets are char boundaries.
    let supplied = digits.as_bytes()[CARD_NUMBER_LEN - 1] - b'0';

    check_digit(&digits[..CARD_NUMBER_LEN - 1]) == Some(supplied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_valid_number() {
        assert!(is_valid("4539148803436467"));
    }

    #[test]
    fn test_check_digit_of_known_payload() {
        assert_eq!(check_digit("453914880343646"), Some(7));
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        assert!(!is_valid(""));
        assert!(!is_valid("453914880343646"));
        assert!(!is_valid("45391488034364670"));
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!(!is_valid("4539 1488 0343 6"));
        assert!(!is_valid("453914880343646x"));
        assert!(!is_valid("45391488034364６"));
        assert!(!is_valid("12345678901234\u{e9}"));
    }

    #[test]
    fn test_single_digit_corruption_detected() {
        assert!(!is_valid("4539148803436468"));
        assert!(!is_valid("5539148803436467"));
    }
}
