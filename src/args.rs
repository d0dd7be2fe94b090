use crate::date::{DateExtractor, DateLayout};
use anyhow::{bail, Context};
use regex::Regex;
use std::time::Duration;
use structopt::StructOpt;
use url::Url;

/// Elasticsearch index retention
///
/// Deletes date-suffixed indices older than the retention window, measured
/// back from the newest matching index rather than from the current date.
#[derive(StructOpt, Debug)]
#[structopt(name = "elasticsearch index retention")]
pub struct Opt {
    // The number of occurrences of the `v/verbose` flag
    /// Verbose mode (-v, -vv)
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: u8,

    /// How many days of indices to keep, counted back from the newest index
    #[structopt(short = "d", long = "days", default_value = "7")]
    pub keep_days: u32,

    /// Only handle indices whose name matches this regular expression
    #[structopt(short = "m", long = "match", default_value = ".*")]
    pub index_match: String,

    /// Elasticsearch base url
    #[structopt(long = "url", default_value = "http://127.0.0.1:9200")]
    pub url: String,

    /// Regular expression locating the date inside an index name
    #[structopt(long, default_value = r"\d{4}\.\d{2}\.\d{2}$")]
    pub time_pattern: String,

    /// Layout of the date found by --time-pattern
    ///
    /// Either a reference-date layout (`2006.01.02`) or a strftime format
    /// (`%Y.%m.%d`).
    #[structopt(long, default_value = "2006.01.02")]
    pub time_layout: String,

    /// Timeout in seconds for each request sent to elasticsearch
    #[structopt(long, default_value = "5")]
    pub timeout: u64,
}

/// Validated settings for a single retention run
#[derive(Clone, Debug)]
pub struct RetentionConfig {
    pub keep_days: u32,
    pub index_filter: Regex,
    pub extractor: DateExtractor,
    pub base_url: Url,
    pub timeout: Duration,
}

impl RetentionConfig {
    /// Validate every option. Nothing here touches the network, so a bad
    /// flag always fails before the cluster is contacted.
    pub fn from_opt(opt: Opt) -> anyhow::Result<RetentionConfig> {
        if opt.keep_days == 0 {
            bail!("days to keep must be larger than zero");
        }
        if opt.timeout == 0 {
            bail!("timeout must be larger than zero");
        }
        let index_filter = Regex::new(&opt.index_match).with_context(|| {
            format!("failed to parse the match regexp: {}", opt.index_match)
        })?;
        let time_pattern = Regex::new(&opt.time_pattern).with_context(|| {
            format!("failed to parse the time pattern: {}", opt.time_pattern)
        })?;
        let layout = DateLayout::parse(&opt.time_layout).with_context(|| {
            format!("failed to parse the time layout: {}", opt.time_layout)
        })?;
        let base_url = Url::parse(&opt.url)
            .with_context(|| format!("failed to parse the url: {}", opt.url))?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => {
                bail!("unsupported url scheme {:?} in {}", scheme, opt.url)
            }
        }

        Ok(RetentionConfig {
            keep_days: opt.keep_days,
            index_filter,
            extractor: DateExtractor::new(time_pattern, layout),
            base_url,
            timeout: Duration::from_secs(opt.timeout),
        })
    }
}
