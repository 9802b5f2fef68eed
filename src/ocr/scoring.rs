//! Pass scoring: rewards structured, confident content over raw length

use crate::layout::TextFragment;

const CJK_WEIGHT: f64 = 2.0;
const DIGIT_WEIGHT: f64 = 1.2;
const OTHER_WEIGHT: f64 = 0.25;
const LINE_BONUS: f64 = 10.0;
const CONFIDENCE_BASE: f64 = 0.25;

fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

/// Score a reconstructed pass. Empty input scores 0.
///
/// Missing confidences count as 0 in the mean.
pub fn score_fragments(fragments: &[TextFragment]) -> f64 {
    if fragments.is_empty() {
        return 0.0;
    }

    let mut cjk = 0usize;
    let mut digits = 0usize;
    let mut other = 0usize;
    let mut total_conf = 0.0;
    for fragment in fragments {
        total_conf += fragment.confidence.unwrap_or(0.0);
        for c in fragment.text.chars() {
            if is_cjk(c) {
                cjk += 1;
            } else if c.is_ascii_digit() {
                digits += 1;
            } else {
                other += 1;
            }
        }
    }

    let mean_conf = total_conf / fragments.len() as f64;
    let content =
        cjk as f64 * CJK_WEIGHT + digits as f64 * DIGIT_WEIGHT + other as f64 * OTHER_WEIGHT;
    (content + fragments.len() as f64 * LINE_BONUS) * (CONFIDENCE_BASE + mean_conf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str, conf: f64) -> TextFragment {
        TextFragment::new(text, Some(conf), None)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(score_fragments(&[]), 0.0);
    }

    #[test]
    fn test_weights() {
        // 3 CJK + 3 digits, one line, conf 0.75
        let s = score_fragments(&[line("合计123元", 0.75)]);
        let expected = (3.0 * 2.0 + 3.0 * 1.2 + 10.0) * 1.0;
        assert!(approx(s, expected), "{s} vs {expected}");

        let s = score_fragments(&[line("ab", 0.75)]);
        assert!(approx(s, 2.0 * 0.25 + 10.0));
    }

    #[test]
    fn test_missing_confidence_counts_as_zero() {
        let s = score_fragments(&[TextFragment::new("12", None, None)]);
        assert!(approx(s, (2.0 * 1.2 + 10.0) * 0.25));
    }

    #[test]
    fn test_more_confident_content_wins() {
        let weak = score_fragments(&[line("发票", 0.4)]);
        let strong = score_fragments(&[line("发票", 0.4), line("号码 0451", 0.9)]);
        assert!(strong > weak);
    }

    #[test]
    fn test_low_confidence_line_can_lower_score() {
        let strong = vec![line(&"发".repeat(50), 1.0)];
        let before = score_fragments(&strong);
        assert!(approx(before, (100.0 + 10.0) * 1.25));

        let mut diluted = strong.clone();
        diluted.push(line("x", 0.0));
        let after = score_fragments(&diluted);
        assert!(approx(after, (100.25 + 20.0) * 0.75));
        assert!(after < before);
    }

    #[test]
    fn test_non_decreasing_when_appending_at_or_above_mean() {
        let mut lines = vec![line("开票日期", 0.8)];
        let mut prev = score_fragments(&lines);
        for (text, conf) in [("2024", 0.8), ("x", 0.9), ("价税合计", 0.95)] {
            lines.push(line(text, conf));
            let next = score_fragments(&lines);
            assert!(next >= prev);
            prev = next;
        }
    }
}
