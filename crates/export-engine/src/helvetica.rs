//! Base-14 Helvetica metrics for comment text measurement.
//!
//! Widths are AFM advance widths in 1/1000 em units for WinAnsi codes
//! 32..=126 and 160..=255; codes outside those ranges measure as zero.

const ASCENT: f32 = 718.0;
const DESCENT: f32 = -207.0;

#[rustfmt::skip]
const WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333,
    389, 584, 278, 333, 278, 278, 556, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 278, 278, 584, 584,
    584, 556, 1015, 667, 667, 722, 722, 667, 611, 778,
    722, 278, 500, 667, 556, 833, 722, 778, 667, 778,
    722, 667, 611, 722, 667, 944, 667, 667, 611, 278,
    278, 278, 469, 556, 222, 556, 556, 500, 556, 556,
    278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500,
    500, 334, 260, 334, 584,
];

// WinAnsi 0xA0..=0xFF, nbsp measured as space and soft hyphen as hyphen.
#[rustfmt::skip]
const UPPER_WIDTHS: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737,
    370, 556, 584, 333, 737, 333, 400, 584, 333, 333,
    333, 556, 537, 278, 333, 333, 365, 556, 834, 834,
    834, 611, 667, 667, 667, 667, 667, 667, 1000, 722,
    667, 667, 667, 667, 278, 278, 278, 278, 722, 722,
    778, 778, 778, 778, 778, 584, 778, 722, 722, 722,
    722, 667, 667, 611, 556, 556, 556, 556, 556, 556,
    889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556,
    556, 556, 556, 500, 556, 500,
];

pub fn glyph_width(code: u8) -> u16 {
    match code {
        32..=126 => WIDTHS[(code - 32) as usize],
        160..=255 => UPPER_WIDTHS[(code - 160) as usize],
        _ => 0,
    }
}

/// Encodes text for a WinAnsi-encoded Type1 font. The Latin-1 block maps
/// straight through; anything else becomes a question mark.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch {
            ' '..='~' => ch as u8,
            '\u{00a0}'..='\u{00ff}' => ch as u8,
            _ => b'?',
        })
        .collect()
}

pub fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 =
        encode_win_ansi(text).iter().map(|&code| u32::from(glyph_width(code))).sum();

    units as f32 * size / 1000.0
}

pub fn line_height(size: f32) -> f32 {
    (ASCENT - DESCENT) * size / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_ascii_text_from_afm_widths() {
        // H = 722, i = 222
        assert_eq!(text_width("Hi", 10.0), (722.0 + 222.0) * 10.0 / 1000.0);
        assert_eq!(text_width("", 10.0), 0.0);
    }

    #[test]
    fn measures_accented_text_from_afm_widths() {
        // c = 500, a = 556, f = 278, eacute = 556
        assert_eq!(text_width("café", 10.0), (500.0 + 556.0 + 278.0 + 556.0) * 10.0 / 1000.0);
        assert_eq!(glyph_width(0xa0), glyph_width(b' '));
    }

    #[test]
    fn line_height_spans_ascent_and_descent() {
        assert_eq!(line_height(10.0), 9.25);
    }

    #[test]
    fn encoding_passes_latin1_and_replaces_the_rest() {
        assert_eq!(encode_win_ansi("né"), vec![b'n', 0xe9]);
        assert_eq!(encode_win_ansi("a\u{2192}b"), vec![b'a', b'?', b'b']);
    }
}
