//! Bulk export of every record matching a request.

use std::collections::HashMap;
use std::sync::Arc;

use common::download_headers::DownloadHeaders;
use common::search_query::DownloadRequest;
use common::search_result::{Document, ResultPage};
use futures::{StreamExt, future, stream};

use crate::api::download::download_details::DownloadDetails;
use crate::api::download::row_sink::RowSink;
use crate::api::download::uid_stats::UidStats;
use crate::api::download::worker_pool::WorkerPool;
use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::api::search::sensitive::apply_sensitivity;
use crate::config::RetryPolicy;
use crate::context::SearchContext;
use crate::db_utils::index_client::{IndexClient, IndexQuery};
use crate::error::{SearchError, is_retryable};

/// Label-table field holding display names of download columns.
pub const HEADER_LABEL_FIELD: &str = "download_header";

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub headers: DownloadHeaders,
    pub written: u64,
}

/// Writes a header row and then one row per matching record to `sink`, in
/// index order.
///
/// Pages are fetched `pool.size()` at a time when a pool is given, one at a
/// time otherwise; the sink sees them in page order either way. With
/// `check_limit` at most `min(DOWNLOAD_MAX_RECORDS, record_cap.max_total)`
/// records are fetched and `details` is marked truncated when the query
/// matched more. A page that still fails after the configured retries aborts
/// the download with [`SearchError::PartialStreamFailure`], as does a sink
/// that fails to take a row; rows already written stay in the sink, which is
/// flushed before returning. The count query is retried like any page.
#[allow(clippy::too_many_arguments)]
pub async fn stream_download(
    ctx: &SearchContext,
    request: &DownloadRequest,
    sink: &mut dyn RowSink,
    uid_stats: &UidStats,
    include_sensitive: bool,
    details: &DownloadDetails,
    check_limit: bool,
    pool: Option<&WorkerPool>,
) -> anyhow::Result<DownloadResult> {
    let config = &ctx.config;
    let fields = if request.fields.is_empty() { config.default_download_fields.clone() } else { request.fields.clone() };
    let headers = DownloadHeaders {
        labels: fields.iter().map(|f| ctx.labels.translate(HEADER_LABEL_FIELD, f)).collect(),
        fields: fields.clone(),
    };

    let mut query = build_query(ctx, &request.search, false, &ExtraParams::new()).await?;
    query.facet.fields.clear();
    query.fields = projection(&fields, &config.data_source_field, include_sensitive);

    let total = match fetch_with_retry(ctx.index.clone(), query.count_only(), config.retry).await {
        Ok(page) => page.total,
        Err(e) => {
            tracing::error!("download count failed: {:#}", e);
            details.mark_failed(format!("{:#}", e));
            return Err(e);
        }
    };
    details.set_total_records(total);

    let cap = if check_limit {
        Some(request.record_cap.max_total.map_or(config.download_max_records, |m| m.min(config.download_max_records)))
    } else {
        None
    };
    let to_fetch = cap.map_or(total, |cap| total.min(cap));
    if to_fetch < total {
        tracing::info!("download truncated: {} of {} matching records", to_fetch, total);
        details.mark_truncated();
    }

    let page_size = config.download_page_size.max(1);
    let concurrency = pool.map_or(1, WorkerPool::size);
    tracing::info!(
        "download of {} records in pages of {} ({} concurrent)",
        to_fetch,
        page_size,
        concurrency
    );

    if let Err(e) = sink.write_row(&headers.labels).await {
        return Err(abort(sink, details, 0, e).await);
    }

    let pages = stream::iter((0..to_fetch).step_by(page_size as usize))
        .take_while(|_| future::ready(!details.is_cancelled()))
        .map(|start| {
            let index = ctx.index.clone();
            let page = query.page(start, page_size.min(to_fetch - start));
            let retry = config.retry;
            let pool = pool.cloned();
            async move {
                match pool {
                    Some(pool) => pool.run(fetch_with_retry(index, page, retry)).await,
                    None => fetch_with_retry(index, page, retry).await,
                }
            }
        })
        .buffered(concurrency);
    let mut pages = std::pin::pin!(pages);

    let mut written = 0u64;
    let mut per_source: HashMap<String, u64> = HashMap::new();
    while let Some(page) = pages.next().await {
        let page = match page {
            Ok(page) => page,
            Err(e) => return Err(abort(sink, details, written, e).await),
        };
        details.page_fetched();
        for mut doc in page.documents {
            if let Some(max) = request.record_cap.max_per_source {
                let seen = per_source.entry(doc.data_source_id.clone()).or_default();
                if *seen >= max {
                    continue;
                }
                *seen += 1;
            }
            apply_sensitivity(&mut doc, include_sensitive, &config.sensitive_fields);
            if let Err(e) = sink.write_row(&row_for(&doc, &fields)).await {
                return Err(abort(sink, details, written, e).await);
            }
            uid_stats.increment(&doc.data_source_id);
            written += 1;
            details.add_written(1);
        }
    }

    if details.is_cancelled() {
        tracing::info!("download cancelled after {} records", written);
    }
    if let Err(e) = sink.flush().await {
        let message = format!("{:#}", e);
        tracing::error!("download flush failed after {} records: {}", written, message);
        details.mark_failed(message.clone());
        return Err(SearchError::PartialStreamFailure { written, message }.into());
    }
    Ok(DownloadResult { headers, written })
}

/// Records the failure, flushes what was written and reports how far the
/// download got. A failing flush is logged; the stream error is what surfaces.
async fn abort(sink: &mut dyn RowSink, details: &DownloadDetails, written: u64, err: anyhow::Error) -> anyhow::Error {
    let message = format!("{:#}", err);
    tracing::error!("download aborted after {} records: {}", written, message);
    details.mark_failed(message.clone());
    if let Err(flush_err) = sink.flush().await {
        tracing::warn!("flush of aborted download failed: {:#}", flush_err);
    }
    SearchError::PartialStreamFailure { written, message }.into()
}

fn projection(fields: &[String], data_source_field: &str, include_sensitive: bool) -> Vec<String> {
    let mut projected = fields.to_vec();
    let mut extra = vec![data_source_field];
    if include_sensitive {
        extra.extend(["sensitive_latitude", "sensitive_longitude"]);
    }
    for field in extra {
        if !projected.iter().any(|f| f == field) {
            projected.push(field.to_string());
        }
    }
    projected
}

fn row_for(doc: &Document, fields: &[String]) -> Vec<String> {
    fields.iter().map(|f| doc.get(f).map(|v| v.to_text()).unwrap_or_default()).collect()
}

async fn fetch_with_retry(index: Arc<dyn IndexClient>, query: IndexQuery, retry: RetryPolicy) -> anyhow::Result<ResultPage> {
    let mut attempt = 0;
    loop {
        match index.execute(&query).await {
            Ok(page) => return Ok(page),
            Err(e) if is_retryable(&e) && attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                tracing::warn!(
                    "page at offset {} failed (attempt {}), retrying in {}ms: {:#}",
                    query.start,
                    attempt + 1,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
