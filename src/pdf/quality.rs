//! Heuristics deciding whether an extracted text layer is worth keeping

/// Keywords that mark an invoice text layer as usable regardless of length
const INVOICE_KEYWORDS: &[&str] = &[
    "发票代码",
    "发票号码",
    "开票日期",
    "校验码",
    "价税合计",
    "合计金额",
    "购买方",
    "销售方",
];

/// Thresholds for [`is_useful_pdf_text`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextQuality {
    pub min_chars: usize,
    pub min_han_ratio: f64,
    /// Below this share of recognizable characters the text is garbled
    pub min_valid_ratio: f64,
}

impl Default for TextQuality {
    fn default() -> Self {
        Self {
            min_chars: 160,
            min_han_ratio: 0.01,
            min_valid_ratio: 0.5,
        }
    }
}

pub fn is_han(c: char) -> bool {
    matches!(c,
        '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2FA1F}')
}

fn is_valid_char(c: char) -> bool {
    is_han(c)
        || c.is_ascii_alphabetic()
        || c.is_numeric()
        || matches!(
            c,
            '，' | '。'
                | '、'
                | '：'
                | '；'
                | '\u{201c}'
                | '\u{201d}'
                | '\u{2018}'
                | '\u{2019}'
                | '（'
                | '）'
                | '【'
                | '】'
                | '￥'
                | '¥'
                | '@'
                | '#'
                | '$'
                | '%'
                | '&'
                | '*'
                | '+'
                | '-'
                | '='
                | '/'
        )
}

impl TextQuality {
    /// Less than `min_valid_ratio` of non-space characters are recognizable.
    pub fn is_garbled(&self, text: &str) -> bool {
        let (valid, total) = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .fold((0usize, 0usize), |(v, t), c| {
                (v + usize::from(is_valid_char(c)), t + 1)
            });
        if total == 0 {
            return true;
        }
        (valid as f64 / total as f64) < self.min_valid_ratio
    }

    /// Share of Han characters among non-space characters.
    pub fn han_ratio(text: &str) -> f64 {
        let (han, total) = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .fold((0usize, 0usize), |(h, t), c| (h + usize::from(is_han(c)), t + 1));
        if total == 0 {
            0.0
        } else {
            han as f64 / total as f64
        }
    }

    pub fn is_useful(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.is_garbled(text) {
            return false;
        }
        if text.chars().count() >= self.min_chars && Self::han_ratio(text) >= self.min_han_ratio {
            return true;
        }
        INVOICE_KEYWORDS.iter().any(|k| text.contains(k))
    }
}

/// [`TextQuality::is_useful`] with default thresholds.
pub fn is_useful_pdf_text(text: &str) -> bool {
    TextQuality::default().is_useful(text)
}
