use chrono::NaiveDate;
use std::collections::BTreeMap;

use carewatch_common::types::{resolve_duplicates, Observation, ObservationValue};

use crate::ConsecutiveSpec;

/// Observations of one patient/metric partitioned into calendar-day buckets.
pub struct DayBuckets {
    days: BTreeMap<NaiveDate, Vec<Observation>>,
}

impl DayBuckets {
    /// Build buckets from a history window. Input need not be sorted;
    /// duplicate `(recorded_at)` readings collapse to the latest ingestion.
    pub fn build(mut observations: Vec<Observation>) -> Self {
        observations.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.ingested_at.cmp(&b.ingested_at))
        });
        let observations = resolve_duplicates(observations);

        let mut days: BTreeMap<NaiveDate, Vec<Observation>> = BTreeMap::new();
        for obs in observations {
            days.entry(obs.recorded_at.date_naive()).or_default().push(obs);
        }
        Self { days }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// A day qualifies if ANY observation recorded that day satisfies the
    /// predicate; not all readings, and not the day's average.
    pub fn day_qualifies<F>(&self, day: NaiveDate, pred: &F) -> bool
    where
        F: Fn(&ObservationValue) -> bool,
    {
        self.days
            .get(&day)
            .is_some_and(|obs| obs.iter().any(|o| pred(&o.value)))
    }

    /// All qualifying days in `[start, end]`, ascending.
    pub fn qualifying_days<F>(&self, start: NaiveDate, end: NaiveDate, pred: &F) -> Vec<NaiveDate>
    where
        F: Fn(&ObservationValue) -> bool,
    {
        self.days
            .range(start..=end)
            .filter(|(_, obs)| obs.iter().any(|o| pred(&o.value)))
            .map(|(day, _)| *day)
            .collect()
    }
}

/// Check a consecutive-occurrence spec against bucketed history.
///
/// `end_day` is the calendar day of the triggering observation; the window
/// is the trailing `window_days` days ending on it, inclusive. Returns the
/// qualifying days when the spec is met, `None` otherwise.
///
/// Default policy counts qualifying days anywhere in the window. With
/// `require_adjacent`, the run must be unbroken and end on `end_day`.
pub fn qualify_window<F>(
    spec: &ConsecutiveSpec,
    buckets: &DayBuckets,
    end_day: NaiveDate,
    pred: &F,
) -> Option<Vec<NaiveDate>>
where
    F: Fn(&ObservationValue) -> bool,
{
    if spec.require_adjacent {
        let mut run = Vec::new();
        let mut day = end_day;
        while buckets.day_qualifies(day, pred) && (run.len() as u32) < spec.window_days {
            run.push(day);
            let Some(prev) = day.pred_opt() else { break };
            day = prev;
        }
        if run.len() as u32 >= spec.min_days {
            run.reverse();
            Some(run)
        } else {
            None
        }
    } else {
        let start = end_day - chrono::Days::new(u64::from(spec.window_days.saturating_sub(1)));
        let qualifying = buckets.qualifying_days(start, end_day, pred);
        if qualifying.len() as u32 >= spec.min_days {
            Some(qualifying)
        } else {
            None
        }
    }
}
