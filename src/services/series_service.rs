use tracing::debug;

use crate::errors::SeriesError;
use crate::models::{Point, RawPoint, Series};
use crate::utils::dates::parse_calendar_date;

/// Parse every raw sample and sort them into a canonical ascending series.
///
/// The first unparseable date fails the whole call. Repeated dates are kept,
/// in input order.
pub fn normalize(raw: &[RawPoint]) -> Result<Series, SeriesError> {
    let mut points = raw
        .iter()
        .enumerate()
        .map(|(index, p)| {
            parse_calendar_date(&p.date)
                .map(|date| Point { date, value: p.value })
                .map_err(|_| SeriesError::InvalidDate {
                    index,
                    value: p.date.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // stable sort keeps input order for equal dates
    points.sort_by_key(|p| p.date);

    debug!("Normalized {} points", points.len());
    Ok(Series::from_sorted(points))
}

/// Routing decision taken before any model is fitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesShape<'a> {
    Empty,
    Single(f64),
    Fittable(&'a Series),
}

pub fn classify(series: &Series) -> SeriesShape<'_> {
    match series.points() {
        [] => SeriesShape::Empty,
        [only] => SeriesShape::Single(only.value),
        _ => SeriesShape::Fittable(series),
    }
}
