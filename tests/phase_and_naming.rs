// tests/phase_and_naming.rs

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use podflow::run::{clean_name, run_name};
use podflow::types::Phase;

fn phase_strategy() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Pending),
        Just(Phase::Running),
        Just(Phase::Succeeded),
        Just(Phase::Failed),
        Just(Phase::Unknown),
    ]
}

fn rank(p: Phase) -> u8 {
    match p {
        Phase::Pending | Phase::Unknown => 0,
        Phase::Running => 1,
        Phase::Succeeded | Phase::Failed => 2,
    }
}

proptest! {
    #[test]
    fn phase_never_moves_backwards(observations in proptest::collection::vec(phase_strategy(), 0..30)) {
        let mut phase = Phase::Pending;
        let mut terminal: Option<Phase> = None;
        for next in observations {
            let advanced = phase.advance(next);
            prop_assert!(rank(advanced) >= rank(phase));
            if let Some(t) = terminal {
                prop_assert_eq!(advanced, t);
            }
            if advanced.is_terminal() {
                terminal = Some(advanced);
            }
            phase = advanced;
        }
    }

    #[test]
    fn cleaned_names_use_cluster_alphabet(name in ".{0,40}") {
        let cleaned = clean_name(&name);
        prop_assert!(cleaned
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'));
    }
}

#[test]
fn terminal_phase_is_sticky() {
    assert_eq!(Phase::Succeeded.advance(Phase::Failed), Phase::Succeeded);
    assert_eq!(Phase::Failed.advance(Phase::Running), Phase::Failed);
    assert_eq!(Phase::Running.advance(Phase::Pending), Phase::Running);
    assert_eq!(Phase::Pending.advance(Phase::Succeeded), Phase::Succeeded);
}

#[test]
fn clean_name_rewrites_special_characters() {
    assert_eq!(clean_name("My_Job 2019:01+00"), "my-job2019-01plus00");
    assert_eq!(clean_name("a/b\\c"), "abc");
}

#[test]
fn run_name_is_deterministic() {
    let ts = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
    let name = run_name("Nightly_Report", ts);
    assert_eq!(name, "nightly-report-2019-01-0100-00-00plus0000utc");
    assert_eq!(name, run_name("Nightly_Report", ts));
}
