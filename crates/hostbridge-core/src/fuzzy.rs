//! Levenshtein-based similarity ratios on a 0–100 scale.
//!
//! [`partial_ratio`] slides the shorter string across the longer one and
//! keeps the best window, so a short target typed by a user can score
//! highly against a long host name that contains something close to it.

/// Normalized Levenshtein similarity, scaled to `0..=100`.
pub fn ratio(a: &str, b: &str) -> u8 {
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u8
}

/// Best [`ratio`] of the shorter string against any equal-length window
/// of the longer string.
///
/// Returns 0 when either side is empty and 100 whenever the shorter string
/// occurs verbatim in the longer one.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    if longer.contains(shorter) {
        return 100;
    }

    let window_len = shorter.chars().count();
    let chars: Vec<char> = longer.chars().collect();
    if window_len == chars.len() {
        return ratio(shorter, longer);
    }

    let mut best = 0;
    for window in chars.windows(window_len) {
        let candidate: String = window.iter().collect();
        best = best.max(ratio(shorter, &candidate));
        if best == 100 {
            break;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_identical() {
        assert_eq!(ratio("devbox", "devbox"), 100);
    }

    #[test]
    fn test_ratio_one_edit() {
        // 1 edit over 15 chars
        assert_eq!(ratio("devlab-game-svx", "devlab-game-svc"), 93);
    }

    #[test]
    fn test_partial_ratio_empty() {
        assert_eq!(partial_ratio("", "devbox"), 0);
        assert_eq!(partial_ratio("devbox", ""), 0);
    }

    #[test]
    fn test_partial_ratio_substring_is_perfect() {
        assert_eq!(partial_ratio("forms", "test-forms"), 100);
        assert_eq!(partial_ratio("test-forms", "forms"), 100);
    }

    #[test]
    fn test_partial_ratio_is_symmetric() {
        assert_eq!(
            partial_ratio("game-svx", "devlab-game-svc"),
            partial_ratio("devlab-game-svc", "game-svx")
        );
    }

    #[test]
    fn test_partial_ratio_close_window() {
        // "game-svx" vs window "game-svc": 1 edit over 8 chars
        assert_eq!(partial_ratio("game-svx", "devlab-game-svc"), 88);
    }

    #[test]
    fn test_partial_ratio_unrelated_is_low() {
        assert!(partial_ratio("zzzz", "test-forms") < 50);
    }

    #[test]
    fn test_partial_ratio_handles_multibyte() {
        assert_eq!(partial_ratio("café", "le-café-01"), 100);
        assert!(partial_ratio("cafe", "le-café-01") >= 75);
    }
}
