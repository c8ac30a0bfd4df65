//! Unicode-block language tagging. Deliberately coarse: mixed-language
//! input resolves to the dominant script, no n-gram models.

use std::fmt;

/// The closed set of language tags this system recognizes. `En` is the
/// default and the fallback for every catalog lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Zh,
    Vi,
    Ja,
    Ko,
    Ru,
    Ar,
    En,
}

impl Lang {
    pub fn tag(&self) -> &'static str {
        match self {
            Lang::Zh => "zh",
            Lang::Vi => "vi",
            Lang::Ja => "ja",
            Lang::Ko => "ko",
            Lang::Ru => "ru",
            Lang::Ar => "ar",
            Lang::En => "en",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// Tie-break priority when two non-default tags reach the same count: the
// earlier tag in this list wins. Chosen to match scripts least likely to
// overlap with Latin diacritic noise first.
const PRIORITY: [Lang; 6] = [Lang::Zh, Lang::Ja, Lang::Ko, Lang::Ru, Lang::Ar, Lang::Vi];

/// A handful of code points is enough to call a script dominant; below this
/// we assume stray punctuation/emoji and fall back to English.
const MIN_COUNT: usize = 2;

fn is_cjk_unified(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

fn is_hiragana_katakana(c: char) -> bool {
    matches!(c as u32, 0x3040..=0x309F | 0x30A0..=0x30FF)
}

fn is_hangul(c: char) -> bool {
    matches!(c as u32, 0xAC00..=0xD7A3)
}

fn is_cyrillic(c: char) -> bool {
    matches!(c as u32, 0x0400..=0x04FF)
}

fn is_arabic(c: char) -> bool {
    matches!(c as u32, 0x0600..=0x06FF | 0x0750..=0x077F)
}

// Vietnamese keeps the Latin alphabet but piles combining/precomposed tone
// marks onto it; we count those rather than plain ASCII letters.
fn is_vietnamese_diacritic(c: char) -> bool {
    matches!(
        c,
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ' | 'ẩ'
            | 'ẫ' | 'ậ' | 'đ' | 'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ'
            | 'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' | 'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ'
            | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ' | 'ở' | 'ỡ' | 'ợ' | 'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư'
            | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' | 'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ'
    )
}

/// Classify `text` into one of the seven language tags.
pub fn detect(text: &str) -> Lang {
    let mut counts = [0usize; 6]; // indexed by PRIORITY

    for c in text.chars() {
        if is_cjk_unified(c) {
            counts[0] += 1;
        } else if is_hiragana_katakana(c) {
            counts[1] += 1;
        } else if is_hangul(c) {
            counts[2] += 1;
        } else if is_cyrillic(c) {
            counts[3] += 1;
        } else if is_arabic(c) {
            counts[4] += 1;
        } else if is_vietnamese_diacritic(c) {
            counts[5] += 1;
        }
    }

    let (best_idx, best_count) = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, &c)| c)
        .map(|(i, &c)| (i, c))
        .unwrap_or((0, 0));

    if best_count >= MIN_COUNT {
        PRIORITY[best_idx]
    } else {
        Lang::En
    }
}
