//! Change planner
//!
//! Pure classification of fingerprinted candidates against the remote
//! inventory snapshot:
//!
//! | remote entry at target path | decision |
//! |---|---|
//! | none | `New` |
//! | folder | `Skipped(FolderConflict)` |
//! | file, both fingerprints present | `Unchanged` iff fingerprints equal, else `Updated` |
//! | file, remote fingerprint absent | `Unchanged` iff sizes equal, else `Updated` |
//!
//! The fingerprint always wins over the size when both are available.
//! Paths are compared case-insensitively.
//!
//! Several local files can land on one remote path: a transform output next
//! to a file of the same name, names differing only in case, or names that
//! sanitize alike. Only one of them is planned; the others are
//! `Skipped(DuplicateTarget)`. The file whose own name is the target wins,
//! then the smallest relative path.

use std::collections::HashMap;

use spsync_core::domain::{CandidateFile, RemoteEntry, SkipReason, SyncDecision};
use tracing::warn;

/// A candidate with its decision and the remote entry it was compared to
#[derive(Debug, Clone)]
pub struct PlannedFile {
    pub candidate: CandidateFile,
    pub decision: SyncDecision,
    pub remote: Option<RemoteEntry>,
}

impl PlannedFile {
    /// Whether the remote copy lacks a stored fingerprint
    ///
    /// Unchanged files in this state get their fingerprint backfilled.
    pub fn remote_fingerprint_missing(&self) -> bool {
        self.remote
            .as_ref()
            .is_some_and(|r| !r.is_folder && r.stored_fingerprint.is_none())
    }
}

/// Classifies one candidate against the remote entry at its target path
pub fn classify(candidate: &CandidateFile, remote: Option<&RemoteEntry>) -> SyncDecision {
    let Some(remote) = remote else {
        return SyncDecision::New;
    };
    if remote.is_folder {
        return SyncDecision::Skipped(SkipReason::FolderConflict);
    }

    let same = match &remote.stored_fingerprint {
        Some(stored) => stored == candidate.fingerprint(),
        None => remote.size_bytes == candidate.size_bytes(),
    };
    if same {
        SyncDecision::Unchanged
    } else {
        SyncDecision::Updated
    }
}

/// Plans every candidate
///
/// With `force_all`, every candidate that does not collide with a remote
/// folder is uploaded: an `Unchanged` classification becomes `Updated`.
pub fn plan(
    candidates: Vec<CandidateFile>,
    inventory: &[RemoteEntry],
    force_all: bool,
) -> Vec<PlannedFile> {
    let by_key: HashMap<String, &RemoteEntry> = inventory
        .iter()
        .map(|entry| (entry.relative_path.key(), entry))
        .collect();

    let owners = target_owners(&candidates);

    candidates
        .into_iter()
        .map(|candidate| {
            let key = candidate.target_relative_path().key();
            let remote = by_key.get(&key).copied();

            let mut decision = match owners.get(&key) {
                Some(owner) if owner != candidate.relative_path().as_str() => {
                    warn!(
                        path = %candidate.relative_path(),
                        target = %candidate.target_relative_path(),
                        kept = %owner,
                        "Another file maps to the same remote path, skipping"
                    );
                    SyncDecision::Skipped(SkipReason::DuplicateTarget(owner.clone()))
                }
                _ => classify(&candidate, remote),
            };
            if force_all && decision == SyncDecision::Unchanged {
                decision = SyncDecision::Updated;
            }
            PlannedFile {
                decision,
                remote: remote.cloned(),
                candidate,
            }
        })
        .collect()
}

/// The candidate that owns each target key
fn target_owners(candidates: &[CandidateFile]) -> HashMap<String, String> {
    let mut owners: HashMap<String, &CandidateFile> = HashMap::new();
    for candidate in candidates {
        let key = candidate.target_relative_path().key();
        let wins = owners
            .get(&key)
            .map_or(true, |current| rank(candidate, &key) < rank(current, &key));
        if wins {
            owners.insert(key, candidate);
        }
    }
    owners
        .into_iter()
        .map(|(key, c)| (key, c.relative_path().as_str().to_string()))
        .collect()
}

fn rank<'a>(candidate: &'a CandidateFile, target_key: &str) -> (bool, &'a str) {
    let renamed = candidate.relative_path().key() != target_key;
    (renamed, candidate.relative_path().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spsync_core::domain::{Fingerprint, LocalFile, RelativePath};

    fn fp(n: u128) -> Fingerprint {
        Fingerprint::from_u128(n)
    }

    fn candidate(path: &str, size: u64, fingerprint: Fingerprint) -> CandidateFile {
        LocalFile {
            absolute_path: format!("/sync/{path}").into(),
            relative_path: RelativePath::new(path).unwrap(),
            size_bytes: size,
        }
        .stage()
        .into_candidate(fingerprint)
    }

    fn remote(path: &str, size: u64, fingerprint: Option<Fingerprint>) -> RemoteEntry {
        RemoteEntry::file(RelativePath::new(path).unwrap(), size, fingerprint)
    }

    fn decisions(planned: &[PlannedFile]) -> Vec<(&str, &SyncDecision)> {
        planned
            .iter()
            .map(|p| (p.candidate.relative_path().as_str(), &p.decision))
            .collect()
    }

    #[test]
    fn test_equal_fingerprints_unchanged_regardless_of_size() {
        let c = candidate("a.md", 10, fp(1));
        let r = remote("a.md", 999, Some(fp(1)));
        assert_eq!(classify(&c, Some(&r)), SyncDecision::Unchanged);
    }

    #[test]
    fn test_fingerprint_wins_over_equal_size() {
        let c = candidate("a.md", 100, fp(1));
        let r = remote("a.md", 100, Some(fp(2)));
        assert_eq!(classify(&c, Some(&r)), SyncDecision::Updated);
    }

    #[test]
    fn test_absent_remote_is_new() {
        let c = candidate("a.md", 1, fp(1));
        assert_eq!(classify(&c, None), SyncDecision::New);
    }

    #[test]
    fn test_size_fallback_without_remote_fingerprint() {
        let c = candidate("report.pdf", 2048, fp(5));
        assert_eq!(
            classify(&c, Some(&remote("report.pdf", 2048, None))),
            SyncDecision::Unchanged
        );
        assert_eq!(
            classify(&c, Some(&remote("report.pdf", 2047, None))),
            SyncDecision::Updated
        );
    }

    #[test]
    fn test_remote_folder_at_target_is_skipped() {
        let c = candidate("docs", 1, fp(1));
        let folder = RemoteEntry::folder(RelativePath::new("docs").unwrap());
        assert_eq!(
            classify(&c, Some(&folder)),
            SyncDecision::Skipped(SkipReason::FolderConflict)
        );
    }

    #[test]
    fn test_plan_scenario_unchanged_and_new() {
        let candidates = vec![candidate("a.md", 100, fp(1)), candidate("b.txt", 20, fp(2))];
        let inventory = vec![remote("a.md", 100, Some(fp(1))), remote("c.txt", 50, Some(fp(3)))];

        let planned = plan(candidates, &inventory, false);
        assert_eq!(
            decisions(&planned),
            vec![
                ("a.md", &SyncDecision::Unchanged),
                ("b.txt", &SyncDecision::New)
            ]
        );
    }

    #[test]
    fn test_plan_matches_case_insensitively() {
        let planned = plan(
            vec![candidate("Docs/A.txt", 3, fp(9))],
            &[remote("docs/a.TXT", 3, Some(fp(9)))],
            false,
        );
        assert_eq!(planned[0].decision, SyncDecision::Unchanged);
    }

    #[test]
    fn test_plan_uses_sanitized_target_path() {
        let planned = plan(
            vec![candidate("Q&A.txt", 3, fp(1))],
            &[remote("Q＆A.txt", 3, Some(fp(1)))],
            false,
        );
        assert_eq!(planned[0].decision, SyncDecision::Unchanged);
    }

    #[test]
    fn test_force_all_uploads_unchanged() {
        let planned = plan(
            vec![candidate("a.md", 1, fp(1)), candidate("docs", 1, fp(2))],
            &[
                remote("a.md", 1, Some(fp(1))),
                RemoteEntry::folder(RelativePath::new("docs").unwrap()),
            ],
            true,
        );
        assert_eq!(planned[0].decision, SyncDecision::Updated);
        assert_eq!(
            planned[1].decision,
            SyncDecision::Skipped(SkipReason::FolderConflict)
        );
    }

    #[test]
    fn test_remote_fingerprint_missing() {
        let planned = plan(
            vec![candidate("a.md", 1, fp(1)), candidate("b.md", 1, fp(2))],
            &[remote("a.md", 1, None), remote("b.md", 1, Some(fp(2)))],
            false,
        );
        assert!(planned[0].remote_fingerprint_missing());
        assert!(!planned[1].remote_fingerprint_missing());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let make = || vec![candidate("x.bin", 7, fp(3)), candidate("y.bin", 8, fp(4))];
        let inventory = vec![remote("x.bin", 7, None)];
        let first = plan(make(), &inventory, false);
        let second = plan(make(), &inventory, false);
        assert_eq!(
            first.iter().map(|p| p.decision.clone()).collect::<Vec<_>>(),
            second.iter().map(|p| p.decision.clone()).collect::<Vec<_>>()
        );
    }

    fn transformed(path: &str, target: &str, size: u64, fingerprint: Fingerprint) -> CandidateFile {
        LocalFile {
            absolute_path: format!("/sync/{path}").into(),
            relative_path: RelativePath::new(path).unwrap(),
            size_bytes: size,
        }
        .stage_transformed(&RelativePath::new(target).unwrap(), vec![0; size as usize])
        .into_candidate(fingerprint)
    }

    #[test]
    fn test_duplicate_target_keeps_file_named_like_target() {
        let candidates = vec![
            candidate("notes.html", 5, fp(1)),
            transformed("notes.md", "notes.html", 9, fp(2)),
        ];
        let planned = plan(candidates, &[remote("notes.html", 5, Some(fp(1)))], false);

        assert_eq!(planned[0].decision, SyncDecision::Unchanged);
        assert_eq!(
            planned[1].decision,
            SyncDecision::Skipped(SkipReason::DuplicateTarget("notes.html".to_string()))
        );
    }

    #[test]
    fn test_duplicate_target_independent_of_order() {
        let forward = plan(
            vec![candidate("A.txt", 1, fp(1)), candidate("a.txt", 2, fp(2))],
            &[],
            false,
        );
        let backward = plan(
            vec![candidate("a.txt", 2, fp(2)), candidate("A.txt", 1, fp(1))],
            &[],
            false,
        );

        for planned in [&forward, &backward] {
            let kept: Vec<_> = planned
                .iter()
                .filter(|p| p.decision == SyncDecision::New)
                .map(|p| p.candidate.relative_path().as_str())
                .collect();
            assert_eq!(kept, vec!["A.txt"]);
        }
    }

    #[test]
    fn test_duplicate_target_still_skipped_with_force_all() {
        let planned = plan(
            vec![candidate("a:b.txt", 1, fp(1)), candidate("a\u{ff1a}b.txt", 1, fp(1))],
            &[],
            true,
        );
        let skipped = planned
            .iter()
            .filter(|p| matches!(p.decision, SyncDecision::Skipped(SkipReason::DuplicateTarget(_))))
            .count();
        assert_eq!(skipped, 1);
    }
}
