//! Horizontally scrolling single-line text.
//!
//! Widths are terminal columns, not chars: wide glyphs count as two.

use unicode_width::UnicodeWidthChar;

/// Separator between the end of the text and its next repetition.
pub const GAP: &str = "   \u{b7}   ";

/// Text that fits is returned unchanged.  Longer text is treated as an
/// endless loop of `text + GAP` and the window starting `offset` columns in
/// is returned, never wider than `width`.
pub fn window(text: &str, width: usize, offset: usize) -> String {
    let text_width: usize = text.chars().map(char_width).sum();
    if text_width <= width {
        return text.to_string();
    }

    let cycle: Vec<char> = text.chars().chain(GAP.chars()).collect();
    let cycle_width: usize = cycle.iter().copied().map(char_width).sum();
    let start = offset % cycle_width.max(1);

    // Find the first char whose left edge is at or after `start`.
    let mut col = 0;
    let mut idx = 0;
    while col < start {
        col += char_width(cycle[idx]);
        idx += 1;
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in cycle.iter().copied().cycle().skip(idx % cycle.len()) {
        let w = char_width(ch);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out
}

fn char_width(ch: char) -> usize {
    ch.width().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicode_width::UnicodeWidthStr;

    #[test]
    fn test_short_text_is_static() {
        assert_eq!(window("Aly & Fila", 20, 0), "Aly & Fila");
        assert_eq!(window("Aly & Fila", 20, 7), "Aly & Fila");
    }

    #[test]
    fn test_long_text_scrolls() {
        assert_eq!(window("abcdefgh", 4, 0), "abcd");
        assert_eq!(window("abcdefgh", 4, 2), "cdef");
        // Wraps through the gap back to the start.
        let tail = window("abcdefgh", 4, 7);
        assert!(tail.starts_with('h'));
        assert_eq!(tail.width(), 4);
    }

    #[test]
    fn test_offset_wraps_around_full_cycle() {
        let cycle = "abcdefgh".len() + GAP.chars().count();
        assert_eq!(window("abcdefgh", 4, cycle), window("abcdefgh", 4, 0));
    }

    #[test]
    fn test_wide_glyphs_never_overflow() {
        let text = "ボーカルトランス FM";
        for offset in 0..30 {
            assert!(window(text, 5, offset).width() <= 5, "offset {offset}");
        }
    }
}
