use std::collections::BTreeSet;

use chrono::NaiveDate;

/// Longest run of calendar-consecutive days among `dates`. Duplicates and
/// input order do not matter.
pub fn max_streak<'a, I>(dates: I) -> usize
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    let distinct: BTreeSet<NaiveDate> = dates.into_iter().copied().collect();
    if distinct.len() <= 1 {
        return distinct.len();
    }

    let mut longest = 1;
    let mut current = 1;
    let mut previous: Option<NaiveDate> = None;

    for date in distinct {
        if let Some(prev) = previous {
            if (date - prev).num_days() == 1 {
                current += 1;
                longest = longest.max(current);
            } else {
                current = 1;
            }
        }
        previous = Some(date);
    }

    longest
}
