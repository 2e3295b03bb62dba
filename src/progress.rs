//! Progress-line parsing for tool output
//!
//! The download tool writes `[download]`-tagged lines while transferring
//! and untagged lines while preparing or post-processing. This module
//! classifies one output line at a time; all state (current percent, the
//! download-started latch) lives on the queue entry and is passed in.

/// Marker prefix on transfer progress lines
pub(crate) const DOWNLOAD_MARKER: &str = "[download]";

/// `[download] Destination: ...` announces the output file; its tokens are
/// never percentages
const DESTINATION_MARKER: &str = "Destination:";

/// Classified output line
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ProgressUpdate {
    /// Transfer progress line; `percent` is the final accepted value when
    /// any token passed the acceptance filter
    Downloading {
        /// New percent, None when no token was accepted
        percent: Option<f64>,
        /// Line with the marker prefix stripped
        message: String,
    },
    /// Non-progress line after the transfer started
    Processing {
        /// Full line
        message: String,
    },
    /// Non-progress line before any transfer started
    Preparing {
        /// Full line
        message: String,
    },
}

/// Percent acceptance filter
///
/// A candidate is accepted against the current value when it moves
/// forward, or looks like the sub-5% reset of a new fragment, or jumps far
/// enough in either direction to be a genuine discontinuity. Small
/// regressions from interleaved fragment output are suppressed.
pub(crate) fn accepts_percent(current: f64, candidate: f64) -> bool {
    candidate > current || candidate < 5.0 || (candidate - current).abs() > 10.0
}

/// Classify one output line
///
/// `last_percent` is the entry's current percentage; `download_started`
/// is true once the entry has seen any transfer progress line during this
/// run attempt.
pub(crate) fn parse_line(line: &str, last_percent: f64, download_started: bool) -> ProgressUpdate {
    if line.contains(DOWNLOAD_MARKER) && !line.contains(DESTINATION_MARKER) {
        let mut current = last_percent;
        let mut accepted = None;

        // Tokens are applied in order; each acceptance moves the baseline,
        // so later tokens on the same line are filtered against it
        for token in line.split_whitespace() {
            if !token.ends_with('%') {
                continue;
            }
            let Ok(candidate) = token.replace('%', "").parse::<f64>() else {
                continue;
            };
            if accepts_percent(current, candidate) {
                current = candidate;
                accepted = Some(candidate);
            }
        }

        ProgressUpdate::Downloading {
            percent: accepted,
            message: line.replace("[download] ", ""),
        }
    } else if download_started {
        ProgressUpdate::Processing {
            message: line.to_string(),
        }
    } else {
        ProgressUpdate::Preparing {
            message: line.to_string(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    // --- line classification ---

    #[test]
    fn marker_line_yields_downloading_with_stripped_message() {
        let update = parse_line(
            "[download]  42.5% of 10.00MiB at 1.20MiB/s ETA 00:05",
            10.0,
            true,
        );
        match update {
            ProgressUpdate::Downloading { percent, message } => {
                assert_eq!(percent, Some(42.5));
                assert_eq!(message, " 42.5% of 10.00MiB at 1.20MiB/s ETA 00:05");
            }
            other => panic!("expected Downloading, got {other:?}"),
        }
    }

    #[test]
    fn destination_line_is_never_a_progress_line() {
        let update = parse_line("[download] Destination: /tmp/video (1080p).mp4", 0.0, false);
        assert_eq!(
            update,
            ProgressUpdate::Preparing {
                message: "[download] Destination: /tmp/video (1080p).mp4".into()
            },
            "Destination lines carry a path, not a percentage, and must keep the full line"
        );
    }

    #[test]
    fn non_marker_line_before_start_is_preparing() {
        let update = parse_line("[youtube] dQw4: Downloading webpage", 0.0, false);
        assert_eq!(
            update,
            ProgressUpdate::Preparing {
                message: "[youtube] dQw4: Downloading webpage".into()
            }
        );
    }

    #[test]
    fn non_marker_line_after_start_is_processing() {
        let update = parse_line("[Merger] Merging formats into \"out.mp4\"", 55.0, true);
        assert_eq!(
            update,
            ProgressUpdate::Processing {
                message: "[Merger] Merging formats into \"out.mp4\"".into()
            }
        );
    }

    #[test]
    fn marker_line_without_percent_token_still_classifies_as_downloading() {
        let update = parse_line("[download] Downloading item 3 of 10", 20.0, true);
        assert_eq!(
            update,
            ProgressUpdate::Downloading {
                percent: None,
                message: "Downloading item 3 of 10".into()
            }
        );
    }

    // --- acceptance filter ---

    #[test]
    fn forward_progress_is_accepted() {
        assert!(accepts_percent(10.0, 10.5));
        assert!(accepts_percent(0.0, 99.9));
    }

    #[test]
    fn small_regression_is_rejected() {
        assert!(
            !accepts_percent(50.0, 49.5),
            "fragment interleaving produces small regressions that must not flap the bar"
        );
        assert!(!accepts_percent(50.0, 42.0));
    }

    #[test]
    fn sub_five_percent_reset_is_accepted() {
        assert!(
            accepts_percent(97.0, 1.2),
            "a new fragment restarting near zero must reset the bar"
        );
        assert!(accepts_percent(50.0, 4.99));
    }

    #[test]
    fn large_jump_in_either_direction_is_accepted() {
        assert!(accepts_percent(50.0, 61.0));
        assert!(
            accepts_percent(50.0, 30.0),
            "a drop of more than 10 points is a discontinuity, not noise"
        );
    }

    #[test]
    fn exact_boundary_values_are_rejected() {
        // The rules are strict comparisons
        assert!(!accepts_percent(50.0, 50.0), "equal value is not forward progress");
        assert!(!accepts_percent(50.0, 40.0), "a drop of exactly 10 is still noise");
        assert!(!accepts_percent(10.0, 5.0), "5.0 is not < 5");
    }

    // --- token scanning ---

    #[test]
    fn chained_tokens_filter_against_the_moving_baseline() {
        // From 50: "3%" accepted (< 5), then "4%" accepted (> 3)
        let update = parse_line("[download] 3% 4%", 50.0, true);
        match update {
            ProgressUpdate::Downloading { percent, .. } => assert_eq!(
                percent,
                Some(4.0),
                "each acceptance moves the baseline for later tokens on the same line"
            ),
            other => panic!("expected Downloading, got {other:?}"),
        }
    }

    #[test]
    fn later_accepted_token_wins() {
        let update = parse_line("[download] 12% done, now at 15%", 10.0, true);
        match update {
            ProgressUpdate::Downloading { percent, .. } => assert_eq!(percent, Some(15.0)),
            other => panic!("expected Downloading, got {other:?}"),
        }
    }

    #[test]
    fn unparsable_percent_tokens_are_skipped() {
        let update = parse_line("[download] n/a% then 33%", 10.0, true);
        match update {
            ProgressUpdate::Downloading { percent, .. } => assert_eq!(
                percent,
                Some(33.0),
                "a garbage token must be skipped, not abort the scan"
            ),
            other => panic!("expected Downloading, got {other:?}"),
        }
    }

    #[test]
    fn rejected_token_leaves_percent_unset() {
        let update = parse_line("[download]  49.0% of 10MiB", 50.0, true);
        match update {
            ProgressUpdate::Downloading { percent, .. } => assert_eq!(
                percent, None,
                "a rejected candidate must not surface as a new percent"
            ),
            other => panic!("expected Downloading, got {other:?}"),
        }
    }

    #[test]
    fn hundred_percent_parses() {
        let update = parse_line("[download] 100% of 10.00MiB in 00:12", 97.3, true);
        match update {
            ProgressUpdate::Downloading { percent, .. } => assert_eq!(percent, Some(100.0)),
            other => panic!("expected Downloading, got {other:?}"),
        }
    }

    // --- randomized sequences ---

    #[test]
    fn acceptance_filter_random_sequences_hold_the_invariant() {
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let mut current = 0.0_f64;
            for _ in 0..500 {
                let candidate: f64 = rng.gen_range(0.0..101.0);
                let accepted = accepts_percent(current, candidate);

                let forward = candidate > current;
                let reset = candidate < 5.0;
                let jump = (candidate - current).abs() > 10.0;

                assert_eq!(
                    accepted,
                    forward || reset || jump,
                    "acceptance must be exactly (forward || reset || jump) for current={current} candidate={candidate}"
                );

                if accepted {
                    current = candidate;
                }
            }
        }
    }

    #[test]
    fn monotonic_sequences_are_fully_accepted() {
        let mut current = 0.0;
        for step in 1..=100 {
            let candidate = f64::from(step);
            assert!(
                accepts_percent(current, candidate),
                "strictly increasing sequences must never be filtered"
            );
            current = candidate;
        }
        assert_eq!(current, 100.0);
    }
}
