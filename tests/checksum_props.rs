//! Property-Based Tests for the card number check digit
//!
//! Run with: cargo test --test checksum_props

use cardscan::checksum::{check_digit, is_valid, CARD_NUMBER_LEN};
use proptest::prelude::*;

fn digits(len: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(0u8..10, len)
        .prop_map(|ds| ds.into_iter().map(|d| char::from(b'0' + d)).collect())
}

fn valid_number() -> impl Strategy<Value = String> {
    digits(CARD_NUMBER_LEN - 1).prop_map(|payload| {
        let check = check_digit(&payload).expect("15-digit payload");
        format!("{}{}", payload, check)
    })
}

#[test]
fn known_vector() {
    assert_eq!(check_digit("453914880343646"), Some(7));
    assert!(is_valid("4539148803436467"));
    assert!(!is_valid("4539148803436468"));
}

/// Multi-byte characters at every byte offset of a 16-byte string.
#[test]
fn multibyte_chars_rejected_at_every_offset() {
    assert!(!is_valid("12345678901234\u{e9}"));

    let number = "4539148803436467";
    for wide in ['\u{e9}', '\u{20ac}', '\u{65e5}', '\u{ff16}', '\u{1f4b3}'] {
        let width = wide.len_utf8();
        for offset in 0..=CARD_NUMBER_LEN - width {
            let mut mutated = String::with_capacity(CARD_NUMBER_LEN);
            mutated.push_str(&number[..offset]);
            mutated.push(wide);
            mutated.push_str(&number[offset + width..]);
            assert_eq!(mutated.len(), CARD_NUMBER_LEN);
            assert!(!is_valid(&mutated), "{:?} accepted", mutated);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// INVARIANT: Exactly one final digit completes any 15-digit payload
    #[test]
    fn exactly_one_check_digit_per_payload(payload in digits(CARD_NUMBER_LEN - 1)) {
        let accepted: Vec<u8> = (0u8..10)
            .filter(|d| is_valid(&format!("{}{}", payload, d)))
            .collect();
        prop_assert_eq!(accepted.len(), 1);
        prop_assert_eq!(Some(accepted[0]), check_digit(&payload));
    }

    /// INVARIANT: Only 16-digit strings can be valid
    #[test]
    fn wrong_lengths_never_valid(
        short in digits(CARD_NUMBER_LEN - 1),
        long in digits(CARD_NUMBER_LEN + 1),
    ) {
        prop_assert!(!is_valid(&short));
        prop_assert!(!is_valid(&long));
    }

    /// INVARIANT: Changing any single digit breaks the check
    #[test]
    fn single_digit_substitution_detected(
        number in valid_number(),
        position in 0usize..CARD_NUMBER_LEN,
        replacement in 0u8..10,
    ) {
        let mut bytes = number.clone().into_bytes();
        let original = bytes[position];
        let replacement = b'0' + replacement;
        prop_assume!(replacement != original);
        bytes[position] = replacement;
        let mutated = String::from_utf8(bytes).unwrap();
        prop_assert!(!is_valid(&mutated), "{} -> {} should fail", number, mutated);
    }

    /// INVARIANT: Any non-digit character makes a string invalid
    #[test]
    fn non_digit_never_valid(
        number in valid_number(),
        position in 0usize..CARD_NUMBER_LEN,
        junk in "[A-Za-z ./-]",
    ) {
        let mut mutated = number.clone();
        mutated.replace_range(position..position + 1, &junk);
        prop_assert!(!is_valid(&mutated));
    }

    /// INVARIANT: Arbitrary text is judged without panicking
    #[test]
    fn arbitrary_text_never_panics(text in "\\PC{1,16}") {
        let valid = is_valid(&text);
        prop_assert!(!valid || text.bytes().all(|b| b.is_ascii_digit()));
    }
}
