//! Synthetic frames and card numbers
//!
//! Lets sessions, lanes and benchmarks run offline with no camera and no
//! recognition backend.

use crate::checksum::{check_digit, CARD_NUMBER_LEN};
use crate::types::{Frame, PixelFormat};

/// Frame size used by [`card_frame`]. Wide enough that every card-sized
/// region crops to a non-trivial image.
pub const CARD_FRAME_SIZE: (u32, u32) = (160, 100);

/// Create a synthetic frame with a gradient that shifts with the sequence
/// number, so consecutive crops differ.
pub fn synthetic_frame(sequence: u64, width: u32, height: u32, format: PixelFormat) -> Frame {
    let bpp = format.bytes_per_pixel();
    let mut data = vec![0u8; width as usize * height as usize * bpp];

    let base = (sequence % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = (y as usize * width as usize + x as usize) * bpp;
            let r = base.wrapping_add((x % 256) as u8);
            let g = base.wrapping_add((y % 256) as u8);
            let b = base.wrapping_add(((x + y) % 256) as u8);
            match format {
                PixelFormat::Rgb8 => data[idx..idx + 3].copy_from_slice(&[r, g, b]),
                PixelFormat::Bgra8 => data[idx..idx + 4].copy_from_slice(&[b, g, r, 255]),
            }
        }
    }

    Frame::new(data, width, height, format)
        .with_sequence(sequence)
        .with_timestamp_us(sequence * 33_333)
}

/// Small RGB frame for session tests.
pub fn card_frame(sequence: u64) -> Frame {
    synthetic_frame(sequence, CARD_FRAME_SIZE.0, CARD_FRAME_SIZE.1, PixelFormat::Rgb8)
}

/// A 16-digit number with a valid check digit.
///
/// Non-digit characters in `prefix` are ignored; the payload is padded with a
/// repeating `0..9` pattern. Returns `None` if the prefix already holds 16 or
/// more digits.
pub fn synthetic_card_number(prefix: &str) -> Option<String> {
    let mut payload: String = prefix.chars().filter(|c| c.is_ascii_digit()).collect();
    if payload.len() >= CARD_NUMBER_LEN {
        return None;
    }

    let mut filler = (0..10u8).cycle();
    while payload.len() < CARD_NUMBER_LEN - 1 {
        let digit = filler.next().unwrap_or(0);
        payload.push(char::from(b'0' + digit));
    }

    let check = check_digit(&payload)?;
    payload.push(char::from(b'0' + check));
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::is_valid;

    #[test]
    fn test_synthetic_frame_is_valid() {
        for format in [PixelFormat::Rgb8, PixelFormat::Bgra8] {
            let frame = synthetic_frame(3, 64, 48, format);
            assert!(frame.validate().is_ok());
            assert_eq!(frame.sequence, 3);
        }
    }

    #[test]
    fn test_synthetic_card_number_passes_checksum() {
        let number = synthetic_card_number("4111").unwrap();
        assert_eq!(number.len(), 16);
        assert!(number.starts_with("4111"));
        assert!(is_valid(&number));
    }

    #[test]
    fn test_synthetic_card_number_ignores_separators() {
        let number = synthetic_card_number("5500 00").unwrap();
        assert!(number.starts_with("550000"));
        assert!(is_valid(&number));
    }

    #[test]
    fn test_full_prefix_rejected() {
        assert!(synthetic_card_number("4539148803436467").is_none());
    }
}
