use anyhow::{anyhow, bail};
use chrono::{
    format::{Item, ParseError, StrftimeItems},
    NaiveDate,
};
use regex::Regex;
use std::fmt::{self, Write};

/// 1970-01-01, the baseline for the newest-date reduction. Older than any
/// real index date.
pub fn epoch() -> NaiveDate {
    NaiveDate::default()
}

// Reference-date tokens (Mon Jan 2 15:04:05 2006) and their strftime
// equivalents. Longer tokens come first so `January` wins over `Jan`,
// `Monday` over `Mon` and `2006` over `06`.
const REFERENCE_TOKENS: &[(&str, &str)] = &[
    ("January", "%B"),
    ("Monday", "%A"),
    ("Mon", "%a"),
    ("2006", "%Y"),
    ("Jan", "%b"),
    ("01", "%m"),
    ("02", "%d"),
    ("06", "%y"),
    ("15", "%H"),
    ("04", "%M"),
    ("05", "%S"),
];

/// A validated date layout, stored as a chrono strftime format.
///
/// Two notations are accepted:
///
/// - a strftime format, recognised by the presence of `%`, e.g. `%Y.%m.%d`
/// - a reference-date layout, e.g. `2006.01.02`, where `2006`, `01` and `02`
///   stand for the year, month and day of the reference date
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateLayout {
    format: String,
}

impl DateLayout {
    pub fn parse(layout: &str) -> anyhow::Result<DateLayout> {
        if layout.is_empty() {
            bail!("time layout must not be empty");
        }
        let format = if layout.contains('%') {
            layout.to_string()
        } else {
            translate_reference_layout(layout)
        };
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error))
        {
            bail!(
                "invalid time layout {:?} (as strftime: {:?})",
                layout,
                format
            );
        }

        // A layout that cannot read back a date it rendered itself would
        // reject every index name, refuse it up front.
        let sample = NaiveDate::from_ymd_opt(2006, 1, 2)
            .and_then(|d| d.and_hms_opt(15, 4, 5))
            .ok_or_else(|| anyhow!("invalid sample date"))?;
        let mut rendered = String::new();
        write!(rendered, "{}", sample.format(&format)).map_err(|_: fmt::Error| {
            anyhow!("time layout {:?} cannot be applied to a date", layout)
        })?;
        match NaiveDate::parse_from_str(&rendered, &format) {
            Ok(date) if date == sample.date() => Ok(DateLayout { format }),
            Ok(date) => bail!(
                "time layout {:?} is ambiguous: {:?} read back as {}",
                layout,
                rendered,
                date
            ),
            Err(e) => Err(anyhow::Error::new(e).context(format!(
                "time layout {:?} does not describe a full calendar date",
                layout
            ))),
        }
    }

    /// The strftime format this layout was resolved to
    pub fn as_strftime(&self) -> &str {
        &self.format
    }

    pub fn parse_date(&self, s: &str) -> Result<NaiveDate, ParseError> {
        NaiveDate::parse_from_str(s, &self.format)
    }
}

fn translate_reference_layout(layout: &str) -> String {
    let mut format = String::with_capacity(layout.len() * 2);
    let mut rest = layout;
    'outer: while !rest.is_empty() {
        for (token, spec) in REFERENCE_TOKENS {
            if let Some(tail) = rest.strip_prefix(*token) {
                format.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            format.push(c);
        }
        rest = chars.as_str();
    }
    format
}

/// Finds the date embedded in an index name and parses it
#[derive(Clone, Debug)]
pub struct DateExtractor {
    pattern: Regex,
    layout: DateLayout,
}

impl DateExtractor {
    pub fn new(pattern: Regex, layout: DateLayout) -> DateExtractor {
        DateExtractor { pattern, layout }
    }

    /// Return `None` if the name carries no date substring, otherwise the
    /// result of parsing the leftmost match with the layout.
    pub fn extract(&self, name: &str) -> Option<Result<NaiveDate, ParseError>> {
        let found = self.pattern.find(name).filter(|m| !m.as_str().is_empty())?;
        Some(self.layout.parse_date(found.as_str()))
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn layout(&self) -> &DateLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn default_extractor() -> DateExtractor {
        DateExtractor::new(
            Regex::new(r"\d{4}\.\d{2}\.\d{2}$").unwrap(),
            DateLayout::parse("%Y.%m.%d").unwrap(),
        )
    }

    #[test]
    fn epoch_is_unix_epoch() {
        assert_eq!(epoch(), ymd(1970, 1, 1));
    }

    #[test]
    fn reference_layout_is_translated() {
        assert_eq!(
            DateLayout::parse("2006.01.02").unwrap().as_strftime(),
            "%Y.%m.%d"
        );
        assert_eq!(
            DateLayout::parse("20060102").unwrap().as_strftime(),
            "%Y%m%d"
        );
        assert_eq!(
            DateLayout::parse("02-Jan-2006").unwrap().as_strftime(),
            "%d-%b-%Y"
        );
        assert_eq!(
            DateLayout::parse("January 02 2006").unwrap().as_strftime(),
            "%B %d %Y"
        );
    }

    #[test]
    fn weekday_names_follow_the_date() {
        let layout = DateLayout::parse("Mon Jan 02 2006").unwrap();
        assert_eq!(layout.as_strftime(), "%a %b %d %Y");
        // 2024-01-10 is a Wednesday
        assert_eq!(layout.parse_date("Wed Jan 10 2024"), Ok(ymd(2024, 1, 10)));

        let layout = DateLayout::parse("Monday, 02-Jan-06").unwrap();
        assert_eq!(layout.as_strftime(), "%A, %d-%b-%y");
        assert_eq!(
            layout.parse_date("Wednesday, 10-Jan-24"),
            Ok(ymd(2024, 1, 10))
        );
    }

    #[test]
    fn both_notations_parse_the_same_date() {
        let reference = DateLayout::parse("2006.01.02").unwrap();
        let strftime = DateLayout::parse("%Y.%m.%d").unwrap();
        assert_eq!(reference, strftime);
        assert_eq!(reference.parse_date("2024.01.10"), Ok(ymd(2024, 1, 10)));
    }

    #[test]
    fn layout_with_time_fields_still_yields_a_date() {
        let layout = DateLayout::parse("2006-01-02T15").unwrap();
        assert_eq!(layout.parse_date("2024-03-05T23"), Ok(ymd(2024, 3, 5)));
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert!(DateLayout::parse("").is_err());
        assert!(DateLayout::parse("%Y.%m.%Q").is_err());
        // no day: cannot produce a calendar date
        assert!(DateLayout::parse("2006.01").is_err());
        assert!(DateLayout::parse("index").is_err());
    }

    #[test]
    fn extracts_trailing_date() {
        let extractor = default_extractor();
        assert_eq!(
            extractor.extract("logstash-2024.01.05"),
            Some(Ok(ymd(2024, 1, 5)))
        );
    }

    #[test]
    fn no_date_substring_is_none() {
        let extractor = default_extractor();
        assert_eq!(extractor.extract("some-alias"), None);
        // anchored at the end
        assert_eq!(extractor.extract("log-2024.01.05-restored"), None);
    }

    #[test]
    fn malformed_date_is_a_parse_error() {
        let extractor = default_extractor();
        assert!(matches!(extractor.extract("log-2024.13.45"), Some(Err(_))));
    }

    #[test]
    fn empty_match_counts_as_no_date() {
        let extractor = DateExtractor::new(
            Regex::new(r"\d*$").unwrap(),
            DateLayout::parse("%Y%m%d").unwrap(),
        );
        assert_eq!(extractor.extract("some-alias"), None);
        assert_eq!(
            extractor.extract("log-20240105"),
            Some(Ok(ymd(2024, 1, 5)))
        );
    }
}
