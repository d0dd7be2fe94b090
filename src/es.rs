use crate::{
    args::RetentionConfig,
    retention::{self, IndexRecord, RetentionPlan},
};
use anyhow::bail;
use elasticsearch::{
    http::{
        transport::{SingleNodeConnectionPool, TransportBuilder},
        StatusCode,
    },
    indices::{IndicesDeleteParts, IndicesStatsParts},
    Elasticsearch, Error,
};
use serde::{de::IgnoredAny, Deserialize};
use std::{collections::BTreeMap, error::Error as StdError, time::Duration};
use url::Url;

/// The part of the `_stats` response we care about. Per-index statistics
/// are skipped, only the index names are kept.
///
/// ```json
/// {
///   "_shards" : { "total" : 10, "successful" : 5, "failed" : 0 },
///   "_all" : { ... },
///   "indices" : {
///     "logstash-2021.05.11" : { "uuid" : "BAtz3c9lTlud4Qn__HeqWA", ... },
///     "logstash-2021.05.12" : { "uuid" : "37CRhvKtQdKward_wVGaVg", ... }
///   }
/// }
/// ```
#[derive(Deserialize, Debug)]
struct ClusterStats {
    indices: BTreeMap<String, IgnoredAny>,
}

/// What happened to a single index deletion
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { index: String },
    Failed { index: String, reason: String },
}

impl DeleteOutcome {
    pub fn index(&self) -> &str {
        match self {
            DeleteOutcome::Deleted { index }
            | DeleteOutcome::Failed { index, .. } => index,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted { .. })
    }
}

#[derive(Clone, Debug)]
pub struct CleanReport {
    pub plan: RetentionPlan,
    pub outcomes: Vec<DeleteOutcome>,
}

impl CleanReport {
    pub fn deleted(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_deleted())
            .map(DeleteOutcome::index)
            .collect()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_deleted())
            .map(DeleteOutcome::index)
            .collect()
    }
}

/// Create a Elasticsearch client, every request it sends is bounded by
/// `timeout`
pub fn create_client(
    url: &Url, timeout: Duration,
) -> anyhow::Result<Elasticsearch, Error> {
    let conn_pool = SingleNodeConnectionPool::new(url.clone());
    let builder = TransportBuilder::new(conn_pool).timeout(timeout);

    let transport = builder.build()?;
    Ok(Elasticsearch::new(transport))
}

/// Short name for the kind of failure behind a client error
pub fn error_kind(err: &Error) -> &'static str {
    if err.is_timeout() {
        return "timeout";
    }
    if err.status_code().is_some() {
        return "status";
    }
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(e) = source {
        if let Some(e) = e.downcast_ref::<reqwest::Error>() {
            return if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else if e.is_decode() {
                "decode"
            } else if e.is_body() {
                "body"
            } else if e.is_builder() || e.is_request() {
                "request"
            } else {
                "http"
            };
        }
        if e.is::<url::ParseError>() {
            return "url";
        }
        if e.is::<serde_json::Error>() {
            return "decode";
        }
        if e.is::<std::io::Error>() {
            return "io";
        }
        source = e.source();
    }
    "other"
}

fn client_error(err: Error, context: String) -> anyhow::Error {
    let kind = error_kind(&err);
    anyhow::Error::new(err).context(format!("{} ({})", context, kind))
}

/// Return the names of every index in the cluster
///
/// Any failure here is fatal: without the full catalog the newest index date
/// is unknown, so no deletion can be decided.
pub async fn fetch_index_names(
    client: &Elasticsearch,
) -> anyhow::Result<Vec<String>> {
    let response = client
        .indices()
        .stats(IndicesStatsParts::None)
        .send()
        .await
        .map_err(|e| client_error(e, "failed to query _stats".to_string()))?;

    let status = response.status_code();
    log::debug!("calling _stats response status: {}", status);
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("failed to query _stats (status): {}, body: {:?}", status, body);
    }

    let body = response
        .text()
        .await
        .map_err(|e| client_error(e, "failed to read _stats".to_string()))?;
    let stats: ClusterStats = serde_json::from_str(&body).map_err(|e| {
        anyhow::Error::new(e).context("failed to parse _stats (decode)")
    })?;

    Ok(stats.indices.into_iter().map(|(name, _)| name).collect())
}

/// Delete index from elasticsearch
///
/// Only `200 OK` counts as deleted, any other status is an error.
pub async fn delete_index(
    client: &Elasticsearch, index: &str,
) -> anyhow::Result<()> {
    let response = client
        .indices()
        .delete(IndicesDeleteParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| {
            client_error(e, format!("failed to delete {}", index))
        })?;

    let status = response.status_code();
    let body = response.text().await.unwrap_or_default();
    log::debug!("delete index: {}, response: {} {:?}", index, status, body);
    if status != StatusCode::OK {
        bail!(
            "failed to delete {} (status): {}, body: {:?}",
            index,
            status,
            body
        );
    }
    Ok(())
}

/// Delete every index concurrently, one task per index, and wait for all of
/// them. Failures are logged and reported, never returned as an error.
pub async fn delete_indices(
    client: &Elasticsearch, indices: &[IndexRecord],
) -> Vec<DeleteOutcome> {
    let tasks = indices
        .iter()
        .map(|record| {
            let client = client.clone();
            let index = record.name.clone();
            let task = tokio::spawn(async move {
                match delete_index(&client, &index).await {
                    Ok(()) => {
                        log::warn!("index deleted: {}", index);
                        DeleteOutcome::Deleted { index }
                    }
                    Err(e) => {
                        let reason = format!("{:#}", e);
                        log::error!(
                            "failed to delete index {}: {}",
                            index,
                            reason
                        );
                        DeleteOutcome::Failed { index, reason }
                    }
                }
            });
            (record.name.clone(), task)
        })
        .collect::<Vec<_>>();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for (index, task) in tasks {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!(
                    "delete task for index {} did not finish: {}",
                    index,
                    e
                );
                DeleteOutcome::Failed { index, reason: e.to_string() }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Remove indices older than the retention window.
///
/// The window ends at the newest dated index matching the filter, not at the
/// current date, so a cluster that stopped receiving data keeps its last
/// `keep_days` days of indices.
pub async fn indices_clean(
    client: &Elasticsearch, config: &RetentionConfig,
) -> anyhow::Result<CleanReport> {
    let names = fetch_index_names(client).await?;
    log::info!("{} indices found", names.len());

    let plan = retention::plan(&names, config);
    log::info!(
        "index_filter: {}, {} candidates, newest: {}, cutoff: {}",
        config.index_filter,
        plan.candidates.len(),
        plan.max_date,
        plan.cutoff
    );
    if plan.outdated.is_empty() {
        log::info!("no outdated indices");
    } else {
        log::info!(
            "indices(< {}): {:#?}",
            plan.cutoff,
            plan.outdated.iter().map(|r| &r.name).collect::<Vec<_>>()
        );
    }

    let outcomes = delete_indices(client, &plan.outdated).await;
    let report = CleanReport { plan, outcomes };
    log::info!(
        "{} indices deleted, {} failed",
        report.deleted().len(),
        report.failed().len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stats_keys_are_index_names() {
        let body = r#"{
            "_shards": { "total": 2, "successful": 2, "failed": 0 },
            "_all": { "primaries": {}, "total": {} },
            "indices": {
                "log-2024.01.02": {
                    "uuid": "a",
                    "primaries": { "docs": { "count": 3 } }
                },
                "log-2024.01.01": { "uuid": "b" },
                ".kibana": {}
            }
        }"#;
        let stats: ClusterStats = serde_json::from_str(body).unwrap();
        assert_eq!(
            stats.indices.keys().collect::<Vec<_>>(),
            vec![".kibana", "log-2024.01.01", "log-2024.01.02"]
        );
    }

    #[test]
    fn stats_without_indices_do_not_decode() {
        let body = r#"{"_all":{}}"#;
        assert!(serde_json::from_str::<ClusterStats>(body).is_err());
    }

    #[test]
    fn report_splits_outcomes() {
        let report = CleanReport {
            plan: RetentionPlan {
                max_date: crate::date::epoch(),
                cutoff: crate::date::epoch(),
                candidates: vec![],
                outdated: vec![],
            },
            outcomes: vec![
                DeleteOutcome::Deleted { index: "a".to_string() },
                DeleteOutcome::Failed {
                    index: "b".to_string(),
                    reason: "status".to_string(),
                },
            ],
        };
        assert_eq!(report.deleted(), vec!["a"]);
        assert_eq!(report.failed(), vec!["b"]);
    }
}
