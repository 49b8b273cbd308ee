//! Batch numbers: `YYMMDD-XXX`, where `XXX` is the zero-padded sequence of
//! runs started that day.
//!
//! Generation is a pure function of the existing numbers and the date. Two
//! runs created concurrently would get the same number, so run creation must
//! be serialized by the caller.

use chrono::NaiveDate;

use crate::run::ManufacturingRun;

/// `YYMMDD` for `date`.
pub fn batch_prefix(date: NaiveDate) -> String {
    date.format("%y%m%d").to_string()
}

/// Next batch number for `today` given every existing batch number.
///
/// Numbers from other days are ignored, as are numbers whose suffix is not an
/// integer. Sequences above 999 keep growing past three digits.
pub fn generate_batch_number<'a, I>(existing: I, today: NaiveDate) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = batch_prefix(today);
    let last = existing
        .into_iter()
        .filter(|number| number.starts_with(&prefix))
        .filter_map(|number| number.split('-').nth(1)?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);

    format!("{prefix}-{:03}", last.saturating_add(1))
}

/// [`generate_batch_number`] over a slice of runs.
pub fn next_batch_number(runs: &[ManufacturingRun], today: NaiveDate) -> String {
    generate_batch_number(runs.iter().map(ManufacturingRun::batch_number), today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feb_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
    }

    #[test]
    fn first_run_of_the_day() {
        assert_eq!(generate_batch_number([], feb_first()), "250201-001");
    }

    #[test]
    fn continues_after_highest_sequence() {
        let existing = ["250201-001", "250201-003"];
        assert_eq!(generate_batch_number(existing, feb_first()), "250201-004");
    }

    #[test]
    fn other_days_do_not_count() {
        let existing = ["250131-007", "240201-002"];
        assert_eq!(generate_batch_number(existing, feb_first()), "250201-001");
    }

    #[test]
    fn malformed_suffixes_are_ignored() {
        let existing = ["250201-abc", "250201", "250201-002", "250201--9"];
        assert_eq!(generate_batch_number(existing, feb_first()), "250201-003");
    }

    #[test]
    fn sequence_grows_past_three_digits() {
        assert_eq!(generate_batch_number(["250201-999"], feb_first()), "250201-1000");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the generated number is new and sorts after every
        /// same-day number.
        #[test]
        fn generated_number_is_unique(seqs in prop::collection::vec(1u32..999, 0..30)) {
            let existing: Vec<String> = seqs.iter().map(|s| format!("250201-{s:03}")).collect();
            let next = generate_batch_number(existing.iter().map(String::as_str), feb_first());

            prop_assert!(!existing.contains(&next));
            let expected = seqs.iter().max().copied().unwrap_or(0) + 1;
            prop_assert_eq!(next, format!("250201-{expected:03}"));
        }
    }
}
