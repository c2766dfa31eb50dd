use chrono::{Days, NaiveDate};

/// Day the generated horizon is counted from (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizonAnchor {
    /// Request date; used by every fallback path.
    Today(NaiveDate),
    /// Last observed date; used by fitted models.
    LastObserved(NaiveDate),
}

impl HorizonAnchor {
    pub fn date(&self) -> NaiveDate {
        match self {
            HorizonAnchor::Today(d) | HorizonAnchor::LastObserved(d) => *d,
        }
    }
}

/// `horizon` consecutive calendar days starting the day after the anchor.
///
/// Stops early at the last representable date, so the result may be shorter
/// than `horizon` but never panics.
pub fn horizon_dates(anchor: HorizonAnchor, horizon: usize) -> Vec<NaiveDate> {
    let start = anchor.date();
    (1..=horizon as u64)
        .map_while(|offset| start.checked_add_days(Days::new(offset)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_dates_start_the_day_after_anchor() {
        let dates = horizon_dates(HorizonAnchor::Today(date(2024, 5, 10)), 3);
        assert_eq!(dates, vec![date(2024, 5, 11), date(2024, 5, 12), date(2024, 5, 13)]);
    }

    #[test]
    fn test_crosses_year_boundary() {
        let dates = horizon_dates(HorizonAnchor::LastObserved(date(2023, 12, 30)), 3);
        assert_eq!(dates, vec![date(2023, 12, 31), date(2024, 1, 1), date(2024, 1, 2)]);
    }

    #[test]
    fn test_stops_at_last_representable_date() {
        let anchor = NaiveDate::MAX - Days::new(2);
        let dates = horizon_dates(HorizonAnchor::LastObserved(anchor), 100_000_000);
        assert_eq!(dates, vec![NaiveDate::MAX - Days::new(1), NaiveDate::MAX]);
    }

    #[test]
    fn test_zero_horizon_is_empty() {
        assert!(horizon_dates(HorizonAnchor::Today(date(2024, 1, 1)), 0).is_empty());
    }
}
