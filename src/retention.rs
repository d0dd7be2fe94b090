use crate::{
    args::RetentionConfig,
    date::{epoch, DateExtractor},
};
use chrono::{Days, NaiveDate};
use regex::Regex;

/// An index that passed the name filter and carries a parseable date
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexRecord {
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidates {
    /// sorted by date, then name
    pub records: Vec<IndexRecord>,
    /// newest candidate date, or the epoch when there are no candidates
    pub max_date: NaiveDate,
}

/// Outcome of the discovery phase: what is kept and what goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionPlan {
    pub max_date: NaiveDate,
    pub cutoff: NaiveDate,
    pub candidates: Vec<IndexRecord>,
    pub outdated: Vec<IndexRecord>,
}

/// Filter index names and parse their embedded dates.
///
/// Names rejected by `filter`, or carrying no date substring, are skipped
/// silently. A date substring that fails to parse is logged and skipped.
pub fn select_candidates<I, S>(
    names: I, filter: &Regex, extractor: &DateExtractor,
) -> Candidates
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records = names
        .into_iter()
        .filter(|name| filter.is_match(name.as_ref()))
        .filter_map(|name| {
            let name = name.as_ref();
            match extractor.extract(name)? {
                Ok(date) => Some(IndexRecord { date, name: name.to_string() }),
                Err(e) => {
                    log::error!(
                        "failed to parse the date in index {}: {}",
                        name,
                        e
                    );
                    None
                }
            }
        })
        .collect::<Vec<_>>();
    records.sort();

    let max_date =
        records.iter().map(|r| r.date).fold(epoch(), std::cmp::max);
    Candidates { records, max_date }
}

/// The oldest date still kept: `max_date` minus `keep_days` calendar days.
pub fn cutoff(max_date: NaiveDate, keep_days: u32) -> NaiveDate {
    max_date
        .checked_sub_days(Days::new(u64::from(keep_days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Candidates dated strictly before `cutoff`
pub fn outdated(
    candidates: &Candidates, cutoff: NaiveDate,
) -> Vec<IndexRecord> {
    candidates
        .records
        .iter()
        .filter(|r| r.date < cutoff)
        .cloned()
        .collect()
}

pub fn plan<I, S>(names: I, config: &RetentionConfig) -> RetentionPlan
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let candidates =
        select_candidates(names, &config.index_filter, &config.extractor);
    let cutoff = cutoff(candidates.max_date, config.keep_days);
    let outdated = outdated(&candidates, cutoff);
    RetentionPlan {
        max_date: candidates.max_date,
        cutoff,
        candidates: candidates.records,
        outdated,
    }
}
