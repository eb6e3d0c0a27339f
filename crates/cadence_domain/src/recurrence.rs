//! The recurrence descriptor and its evaluator. The descriptor is the JSON
//! shape persisted on a task; [`occurs_on`] is the pure predicate every
//! calendar view calls once per (task, date) pair, so it stays O(1) beyond
//! set membership.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dates::CanonicalDate;

/// Declarative schedule embedded on a task. `exceptions` removes days the
/// pattern would otherwise predict; `additional_dates` conditionally adds
/// days outside it (an additional date only counts once a real completion
/// exists, which is the projector's rule, not the evaluator's).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    #[serde(flatten)]
    pub pattern: Pattern,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<CanonicalDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<CanonicalDate>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exceptions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub additional_dates: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Pattern {
    /// One-time: occurs on `start_date` alone, or never when undated.
    None,
    /// Every N days counted from `start_date`.
    #[serde(alias = "interval")]
    Daily {
        #[serde(default = "default_interval")]
        interval: u32,
    },
    /// Weekday numbers with Sunday as 0.
    Weekly { days: BTreeSet<u8> },
    Monthly {
        #[serde(flatten)]
        anchor: MonthlyAnchor,
        #[serde(skip_serializing_if = "Option::is_none")]
        interval: Option<u32>,
    },
    Yearly {
        month: u32,
        #[serde(flatten)]
        anchor: MonthlyAnchor,
    },
}

/// The two ways a monthly (or yearly) pattern picks its day: explicit days
/// of the month, or "the Nth such weekday" (2nd Tuesday).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MonthlyAnchor {
    #[serde(rename_all = "camelCase")]
    DayOfMonth { day_of_month: BTreeSet<u32> },
    #[serde(rename_all = "camelCase")]
    OrdinalWeekday { ordinal: u32, day_of_week: u8 },
}

fn default_interval() -> u32 {
    1
}

impl Recurrence {
    /// A single fixed occurrence on `date`.
    pub fn once_on(date: CanonicalDate) -> Self {
        Self {
            pattern: Pattern::None,
            start_date: Some(date),
            end_date: None,
            exceptions: BTreeSet::new(),
            additional_dates: BTreeSet::new(),
        }
    }

    pub fn is_one_time(&self) -> bool {
        matches!(self.pattern, Pattern::None)
    }

    /// Suppresses the pattern on one day for this task alone.
    pub fn suppress_on(&mut self, date: CanonicalDate) {
        self.exceptions.insert(date.date_string());
    }
}

/// Whether the declared pattern predicts an occurrence on `candidate`.
///
/// Precedence: the start/end window bounds everything, exceptions beat any
/// pattern match, then the pattern decides. Additional dates are never
/// consulted here; a date the pattern does not predict stays `false` and the
/// off-schedule mechanism governs its visibility.
pub fn occurs_on(recurrence: &Recurrence, candidate: CanonicalDate) -> bool {
    if let Some(start) = recurrence.start_date {
        if candidate < start {
            return false;
        }
    }
    if let Some(end) = recurrence.end_date {
        if candidate > end {
            return false;
        }
    }
    if recurrence.exceptions.contains(&candidate.date_string()) {
        return false;
    }

    match &recurrence.pattern {
        Pattern::None => recurrence.start_date == Some(candidate),
        Pattern::Daily { interval } => {
            // A daily cadence is meaningless without an anchor day.
            let Some(start) = recurrence.start_date else {
                return false;
            };
            let step = i64::from((*interval).max(1));
            start.days_until(candidate) % step == 0
        }
        Pattern::Weekly { days } => days.contains(&candidate.weekday_number()),
        Pattern::Monthly { anchor, interval } => {
            anchor_matches(anchor, candidate)
                && month_interval_matches(recurrence.start_date, candidate, *interval)
        }
        Pattern::Yearly { month, anchor } => {
            candidate.month() == *month && anchor_matches(anchor, candidate)
        }
    }
}

fn anchor_matches(anchor: &MonthlyAnchor, candidate: CanonicalDate) -> bool {
    match anchor {
        MonthlyAnchor::DayOfMonth { day_of_month } => {
            day_of_month.contains(&candidate.day_of_month())
        }
        MonthlyAnchor::OrdinalWeekday {
            ordinal,
            day_of_week,
        } => {
            candidate.weekday_number() == *day_of_week && candidate.weekday_ordinal() == *ordinal
        }
    }
}

fn month_interval_matches(
    start: Option<CanonicalDate>,
    candidate: CanonicalDate,
    interval: Option<u32>,
) -> bool {
    let step = interval.unwrap_or(1).max(1) as i32;
    if step == 1 {
        return true;
    }
    let Some(start) = start else {
        return true;
    };
    start.months_until(candidate) % step == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> CanonicalDate {
        CanonicalDate::parse(s).expect("valid date")
    }

    fn weekly(days: &[u8], start: &str) -> Recurrence {
        Recurrence {
            pattern: Pattern::Weekly {
                days: days.iter().copied().collect(),
            },
            start_date: Some(day(start)),
            end_date: None,
            exceptions: BTreeSet::new(),
            additional_dates: BTreeSet::new(),
        }
    }

    #[test]
    fn weekly_pattern_matches_listed_weekdays_only() {
        let rec = weekly(&[1, 3, 5], "2024-01-01"); // Mon/Wed/Fri
        assert!(occurs_on(&rec, day("2024-01-03"))); // Wednesday
        assert!(!occurs_on(&rec, day("2024-01-04"))); // Thursday
    }

    #[test]
    fn exceptions_win_over_a_matching_pattern() {
        let mut rec = weekly(&[1, 3, 5], "2024-01-01");
        rec.suppress_on(day("2024-01-03"));
        assert!(!occurs_on(&rec, day("2024-01-03")));
        assert!(occurs_on(&rec, day("2024-01-05")));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let mut rec = weekly(&[1, 3, 5], "2024-01-01");
        rec.end_date = Some(day("2024-01-05"));
        assert!(occurs_on(&rec, day("2024-01-01")));
        assert!(occurs_on(&rec, day("2024-01-05")));
        assert!(!occurs_on(&rec, day("2024-01-08")));
        assert!(!occurs_on(&rec, day("2023-12-29")));
    }

    #[test]
    fn daily_interval_counts_from_the_anchor() {
        let rec = Recurrence {
            pattern: Pattern::Daily { interval: 3 },
            start_date: Some(day("2024-01-01")),
            end_date: None,
            exceptions: BTreeSet::new(),
            additional_dates: BTreeSet::new(),
        };
        assert!(occurs_on(&rec, day("2024-01-01")));
        assert!(occurs_on(&rec, day("2024-01-04")));
        assert!(!occurs_on(&rec, day("2024-01-05")));

        let unanchored = Recurrence {
            start_date: None,
            ..rec
        };
        assert!(!occurs_on(&unanchored, day("2024-01-04")));
    }

    #[test]
    fn one_time_pattern_matches_its_start_date_exactly() {
        let rec = Recurrence::once_on(day("2024-06-15"));
        assert!(occurs_on(&rec, day("2024-06-15")));
        assert!(!occurs_on(&rec, day("2024-06-16")));
        assert!(!occurs_on(
            &Recurrence {
                start_date: None,
                ..rec
            },
            day("2024-06-15")
        ));
    }

    #[test]
    fn monthly_day_of_month_honors_the_month_interval() {
        let rec = Recurrence {
            pattern: Pattern::Monthly {
                anchor: MonthlyAnchor::DayOfMonth {
                    day_of_month: [1, 15].into_iter().collect(),
                },
                interval: Some(2),
            },
            start_date: Some(day("2024-01-01")),
            end_date: None,
            exceptions: BTreeSet::new(),
            additional_dates: BTreeSet::new(),
        };
        assert!(occurs_on(&rec, day("2024-01-15")));
        assert!(!occurs_on(&rec, day("2024-02-15"))); // off-interval month
        assert!(occurs_on(&rec, day("2024-03-01")));
        assert!(!occurs_on(&rec, day("2024-03-02")));
    }

    #[test]
    fn monthly_ordinal_weekday_picks_the_nth_occurrence() {
        // 2nd Tuesday of each month.
        let rec = Recurrence {
            pattern: Pattern::Monthly {
                anchor: MonthlyAnchor::OrdinalWeekday {
                    ordinal: 2,
                    day_of_week: 2,
                },
                interval: None,
            },
            start_date: Some(day("2024-01-01")),
            end_date: None,
            exceptions: BTreeSet::new(),
            additional_dates: BTreeSet::new(),
        };
        assert!(occurs_on(&rec, day("2024-03-12")));
        assert!(!occurs_on(&rec, day("2024-03-05"))); // 1st Tuesday
        assert!(!occurs_on(&rec, day("2024-03-13"))); // Wednesday
    }

    #[test]
    fn yearly_requires_the_month_to_match_too() {
        let rec = Recurrence {
            pattern: Pattern::Yearly {
                month: 7,
                anchor: MonthlyAnchor::DayOfMonth {
                    day_of_month: [4].into_iter().collect(),
                },
            },
            start_date: Some(day("2020-07-04")),
            end_date: None,
            exceptions: BTreeSet::new(),
            additional_dates: BTreeSet::new(),
        };
        assert!(occurs_on(&rec, day("2024-07-04")));
        assert!(!occurs_on(&rec, day("2024-08-04")));
        assert!(!occurs_on(&rec, day("2024-07-05")));
    }

    #[test]
    fn additional_dates_are_not_the_evaluators_business() {
        let mut rec = weekly(&[1], "2024-01-01");
        rec.additional_dates.insert("2024-01-06".to_string());
        // Saturday is not in the pattern; the projector decides whether the
        // additional date renders, based on a real completion.
        assert!(!occurs_on(&rec, day("2024-01-06")));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let rec = weekly(&[2, 4], "2024-01-01");
        let candidate = day("2024-04-16");
        let first = occurs_on(&rec, candidate);
        for _ in 0..100 {
            assert_eq!(occurs_on(&rec, candidate), first);
        }
    }

    #[test]
    fn descriptor_json_round_trips_with_camel_case_fields() {
        let mut rec = weekly(&[1, 3, 5], "2024-01-01");
        rec.end_date = Some(day("2024-06-30"));
        rec.suppress_on(day("2024-01-03"));
        rec.additional_dates.insert("2024-01-06".to_string());

        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "weekly");
        assert_eq!(json["days"], serde_json::json!([1, 3, 5]));
        assert_eq!(json["startDate"], "2024-01-01T00:00:00.000Z");
        assert_eq!(json["exceptions"], serde_json::json!(["2024-01-03"]));
        assert_eq!(json["additionalDates"], serde_json::json!(["2024-01-06"]));

        let back: Recurrence = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn legacy_interval_type_tag_still_deserializes_as_daily() {
        let rec: Recurrence = serde_json::from_str(
            r#"{"type":"interval","interval":2,"startDate":"2024-01-01"}"#,
        )
        .unwrap();
        assert_eq!(rec.pattern, Pattern::Daily { interval: 2 });
    }

    #[test]
    fn monthly_anchor_forms_deserialize_distinctly() {
        let by_day: Recurrence =
            serde_json::from_str(r#"{"type":"monthly","dayOfMonth":[1,15]}"#).unwrap();
        assert!(matches!(
            by_day.pattern,
            Pattern::Monthly {
                anchor: MonthlyAnchor::DayOfMonth { .. },
                ..
            }
        ));

        let by_ordinal: Recurrence =
            serde_json::from_str(r#"{"type":"monthly","ordinal":2,"dayOfWeek":2}"#).unwrap();
        assert!(matches!(
            by_ordinal.pattern,
            Pattern::Monthly {
                anchor: MonthlyAnchor::OrdinalWeekday {
                    ordinal: 2,
                    day_of_week: 2
                },
                ..
            }
        ));
    }
}
