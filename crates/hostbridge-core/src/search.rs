//! Resolve free-text targets to ranked instances.
//!
//! # Scoring
//!
//! Every target is compared, case-insensitively, with every match name of
//! every instance (the name followed by its aliases):
//!
//! | Condition | Score |
//! |-----------|-------|
//! | target equals the name | [`EXACT_SCORE`] (100) |
//! | `partial` and target is a substring of the name | [`PARTIAL_SCORE`] (99) |
//! | `fuzzy` and partial ratio > [`FUZZY_THRESHOLD`], or substring | the ratio itself |
//!
//! A fuzzy ratio is recorded in addition to any exact/partial score, so a
//! strong fuzzy hit can outrank a partial hit from another pair.
//!
//! # Ranking
//!
//! 1. Collect every distinct `(score, instance)` pair.
//! 2. Sort ascending by score, ties by the instance's natural order.
//! 3. Keep each instance at its last (highest-scored) position.
//! 4. Reverse, so the best match comes first.

use std::collections::{BTreeSet, HashSet};

use crate::fuzzy::partial_ratio;
use crate::models::Instance;

pub const EXACT_SCORE: u8 = 100;
pub const PARTIAL_SCORE: u8 = 99;
/// Fuzzy ratios must be strictly greater than this to count.
pub const FUZZY_THRESHOLD: u8 = 85;

/// How loosely a target may match a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Accept a target that is a substring of a name.
    pub partial: bool,
    /// Accept names within fuzzy edit distance of the target.
    pub fuzzy: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            partial: true,
            fuzzy: false,
        }
    }
}

impl MatchOptions {
    pub fn exact() -> Self {
        Self {
            partial: false,
            fuzzy: false,
        }
    }

    pub fn fuzzy() -> Self {
        Self {
            partial: true,
            fuzzy: true,
        }
    }
}

/// Every score `target` earns against `instance`, one entry per satisfied
/// `(match name, rule)` combination. Empty means no match.
pub fn candidate_scores(target: &str, instance: &Instance, opts: MatchOptions) -> Vec<u8> {
    let target = target.to_lowercase();
    let mut scores = Vec::new();

    for name in instance.match_names() {
        let name = name.to_lowercase();
        let is_substring = name.contains(&target);

        if target == name {
            scores.push(EXACT_SCORE);
        } else if opts.partial && is_substring {
            scores.push(PARTIAL_SCORE);
        }

        if opts.fuzzy {
            let score = partial_ratio(&target, &name);
            if score > FUZZY_THRESHOLD || is_substring {
                scores.push(score);
            }
        }
    }

    scores
}

/// Rank `instances` against every target, best match first, each instance
/// at most once.
///
/// Blank targets are ignored.
pub fn rank<S: AsRef<str>>(instances: &[Instance], targets: &[S], opts: MatchOptions) -> Vec<Instance> {
    let mut matched: BTreeSet<(u8, &Instance)> = BTreeSet::new();

    for target in targets {
        let target = target.as_ref().trim();
        if target.is_empty() {
            continue;
        }
        for instance in instances {
            for score in candidate_scores(target, instance, opts) {
                matched.insert((score, instance));
            }
        }
    }

    let mut seen: HashSet<&Instance> = HashSet::new();
    matched
        .into_iter()
        .rev()
        .filter(|(_, instance)| seen.insert(*instance))
        .map(|(_, instance)| instance.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(name: &str, address: &str, aliases: &[&str]) -> Instance {
        Instance::new(name, address, "aws")
            .unwrap()
            .with_aliases(aliases.iter().copied())
    }

    fn fleet() -> Vec<Instance> {
        vec![
            inst("test-forms", "devbox", &["devbox", "i-e54cbaeb"]),
            inst("devlab-forms", "devbox", &["devbox", "i-f7d726f9"]),
            inst("test-account-svc", "devbox", &["devbox", "i-f4d726fa"]),
            inst("devlab-pubsrv", "devbox", &["devbox", "i-f5d726fb"]),
            inst("devlab-game-svc", "devbox", &["devbox", "i-f2d726fc"]),
            inst("test-game-svc", "devbox", &["devbox", "i-f3d726fd"]),
        ]
    }

    fn names(result: &[Instance]) -> Vec<&str> {
        result.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_exact_scores_100() {
        let i = inst("Test-Forms", "devbox", &[]);
        assert_eq!(candidate_scores("test-forms", &i, MatchOptions::default()), vec![100]);
    }

    #[test]
    fn test_partial_scores_99() {
        let i = inst("test-forms", "devbox", &[]);
        assert_eq!(candidate_scores("TEST", &i, MatchOptions::default()), vec![99]);
        assert!(candidate_scores("test", &i, MatchOptions::exact()).is_empty());
    }

    #[test]
    fn test_scores_every_match_name() {
        let i = inst("test-forms", "devbox", &["devbox", "i-e54cbaeb"]);
        let scores = candidate_scores("devbox", &i, MatchOptions::default());
        assert_eq!(scores, vec![100]);
        let scores = candidate_scores("e", &i, MatchOptions::default());
        assert_eq!(scores, vec![99, 99, 99]);
    }

    #[test]
    fn test_fuzzy_adds_ratio() {
        let i = inst("devlab-game-svc", "devbox", &[]);
        assert!(candidate_scores("devlab-game-svx", &i, MatchOptions::default()).is_empty());
        assert_eq!(
            candidate_scores("devlab-game-svx", &i, MatchOptions::fuzzy()),
            vec![93]
        );
    }

    #[test]
    fn test_fuzzy_substring_records_ratio_too() {
        let i = inst("test-forms", "devbox", &[]);
        assert_eq!(candidate_scores("forms", &i, MatchOptions::fuzzy()), vec![99, 100]);
    }

    #[test]
    fn test_fuzzy_below_threshold_ignored() {
        let i = inst("test-forms", "devbox", &[]);
        assert!(candidate_scores("tset", &i, MatchOptions::fuzzy()).is_empty());
    }

    #[test]
    fn test_partial_match_excludes_non_matching() {
        let result = rank(&fleet(), &["test"], MatchOptions::default());
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|i| i.name.starts_with("test-")));
        assert!(!names(&result).contains(&"devlab-forms"));
    }

    #[test]
    fn test_exact_outranks_partial() {
        let instances = vec![
            inst("web", "10.0.0.1", &[]),
            inst("web-canary", "10.0.0.2", &[]),
            inst("aaa-web", "10.0.0.3", &[]),
        ];
        let result = rank(&instances, &["web"], MatchOptions::default());
        assert_eq!(result[0].name, "web");
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_ties_in_reverse_natural_order() {
        let instances = vec![
            inst("web-b", "10.0.0.2", &[]),
            inst("web-a", "10.0.0.1", &[]),
            inst("web-c", "10.0.0.3", &[]),
        ];
        let result = rank(&instances, &["web"], MatchOptions::default());
        assert_eq!(names(&result), vec!["web-c", "web-b", "web-a"]);
    }

    #[test]
    fn test_two_targets_dedupe_at_best_score() {
        let instances = vec![
            inst("alpha-db", "10.0.0.1", &[]),
            inst("beta-db", "10.0.0.2", &[]),
        ];
        // beta-db is an exact hit for one target and a partial hit for the other
        let result = rank(&instances, &["db", "beta-db"], MatchOptions::default());
        assert_eq!(names(&result), vec!["beta-db", "alpha-db"]);
    }

    #[test]
    fn test_fuzzy_never_removes_results() {
        let targets = ["test", "game"];
        let plain = rank(&fleet(), &targets, MatchOptions::default());
        let fuzzy = rank(&fleet(), &targets, MatchOptions::fuzzy());
        for i in &plain {
            assert!(fuzzy.contains(i), "fuzzy search dropped {}", i.name);
        }
    }

    #[test]
    fn test_fuzzy_finds_typo() {
        let result = rank(&fleet(), &["devlab-game-svx"], MatchOptions::fuzzy());
        assert_eq!(result[0].name, "devlab-game-svc");
        assert!(rank(&fleet(), &["devlab-game-svx"], MatchOptions::default()).is_empty());
    }

    #[test]
    fn test_blank_targets_ignored() {
        assert!(rank(&fleet(), &["", "  "], MatchOptions::default()).is_empty());
    }

    #[test]
    fn test_no_targets() {
        let targets: [&str; 0] = [];
        assert!(rank(&fleet(), &targets, MatchOptions::fuzzy()).is_empty());
    }

    #[test]
    fn test_matches_alias() {
        let result = rank(&fleet(), &["i-f2d726fc"], MatchOptions::exact());
        assert_eq!(names(&result), vec!["devlab-game-svc"]);
    }
}
