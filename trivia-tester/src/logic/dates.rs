use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate};
use trivia_engine::SubjectSnapshot;

/// Longest range a single `A..B` token may expand to.
const MAX_RANGE_DAYS: i64 = 366;

/// One episode date requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSpec {
    Fixed(NaiveDate),
    /// The day of the snapshot's most recent TVL point.
    Latest,
}

impl DateSpec {
    /// Concrete date for `snapshot`, or `None` when `Latest` has no series to read.
    #[must_use]
    pub fn resolve(self, snapshot: &SubjectSnapshot) -> Option<NaiveDate> {
        match self {
            Self::Fixed(date) => Some(date),
            Self::Latest => snapshot
                .raw
                .tvl_series
                .last()
                .and_then(|point| DateTime::from_timestamp(point.time, 0))
                .map(|dt| dt.date_naive()),
        }
    }
}

fn parse_date(token: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{token}', expected YYYY-MM-DD"))
}

/// Resolve CLI date tokens into date specs.
///
/// Supports ISO dates, inclusive `A..B` ranges and the keyword `latest`.
pub fn resolve_date_inputs(tokens: &[String]) -> Result<Vec<DateSpec>> {
    let mut specs = Vec::new();
    for token in tokens {
        if token.eq_ignore_ascii_case("latest") {
            if !specs.contains(&DateSpec::Latest) {
                specs.push(DateSpec::Latest);
            }
            continue;
        }

        if let Some((start, end)) = token.split_once("..") {
            let start = parse_date(start.trim())?;
            let end = parse_date(end.trim())?;
            let span = (end - start).num_days();
            if span < 0 {
                bail!("date range '{token}' ends before it starts");
            }
            if span >= MAX_RANGE_DAYS {
                bail!("date range '{token}' spans more than {MAX_RANGE_DAYS} days");
            }
            for date in start.iter_days().take_while(|date| *date <= end) {
                let spec = DateSpec::Fixed(date);
                if !specs.contains(&spec) {
                    specs.push(spec);
                }
            }
            continue;
        }

        let spec = DateSpec::Fixed(parse_date(token)?);
        if !specs.contains(&spec) {
            specs.push(spec);
        }
    }

    if specs.is_empty() {
        bail!("no dates requested");
    }
    Ok(specs)
}
