//! Visits every matching document without holding the result set in memory.

use common::search_query::SearchRequest;
use common::search_result::{Document, FacetResult};
use futures::StreamExt;

use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::api::search::sensitive::apply_sensitivity;
use crate::context::SearchContext;

/// Feeds each matching document to `visit` in index order, paging through the
/// index `DOWNLOAD_PAGE_SIZE` records at a time. `visit` returns `false` to
/// stop early. Returns the number of documents visited.
pub async fn stream_documents<F>(ctx: &SearchContext, request: &SearchRequest, mut visit: F) -> anyhow::Result<u64>
where
    F: FnMut(Document) -> anyhow::Result<bool> + Send,
{
    let mut query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    query.facet.fields.clear();
    let mut documents = ctx.index.execute_streaming(&query, ctx.config.download_page_size);
    let mut visited = 0u64;
    while let Some(doc) = documents.next().await {
        let mut doc = doc?;
        apply_sensitivity(&mut doc, request.include_sensitive, &ctx.config.sensitive_fields);
        visited += 1;
        if !visit(doc)? {
            break;
        }
    }
    tracing::debug!("streamed {} documents for {:?}", visited, query.query);
    Ok(visited)
}

/// Feeds every value of each requested facet to `on_facet`, one facet at a
/// time with labels translated, then streams the documents through
/// `on_document` like [`stream_documents`]. `on_facet` returns `false` to skip
/// the remaining facets. Returns the number of documents visited.
pub async fn streaming_query<D, F>(ctx: &SearchContext, request: &SearchRequest, on_document: D, mut on_facet: F) -> anyhow::Result<u64>
where
    D: FnMut(Document) -> anyhow::Result<bool> + Send,
    F: FnMut(FacetResult) -> anyhow::Result<bool> + Send,
{
    if !request.facets.is_empty() {
        let mut extra = ExtraParams::new();
        extra.insert("facet.limit".to_string(), vec!["-1".to_string()]);
        let query = build_query(ctx, request, false, &extra).await?;
        for mut facet in ctx.index.execute_facets(&query).await? {
            ctx.labels.translate_facet(&mut facet);
            if !on_facet(facet)? {
                break;
            }
        }
    }
    stream_documents(ctx, request, on_document).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use common::search_result::FieldValue;

    use crate::config::SearchConfig;
    use crate::db_utils::memory_index::MemoryIndex;

    fn context() -> (SearchContext, Arc<MemoryIndex>) {
        let docs = (0..25)
            .map(|i| Document::new(i.to_string(), format!("dr{}", i % 2)).with_field("month", FieldValue::Int(1 + i % 12)))
            .collect();
        let index = Arc::new(MemoryIndex::new(docs));
        let mut config = SearchConfig::default();
        config.download_page_size = 10;
        (SearchContext::new(config, index.clone()), index)
    }

    #[tokio::test]
    async fn visits_all_pages_in_order() {
        let (ctx, index) = context();
        let mut ids = Vec::new();
        let visited = stream_documents(&ctx, &SearchRequest::default(), |doc| {
            ids.push(doc.id);
            Ok(true)
        })
        .await
        .unwrap();
        assert_eq!(visited, 25);
        assert_eq!(ids.first().map(String::as_str), Some("0"));
        assert_eq!(ids.last().map(String::as_str), Some("24"));
        assert_eq!(index.page_fetches().len(), 3);
    }

    #[tokio::test]
    async fn callback_can_stop_early() {
        let (ctx, index) = context();
        let visited = stream_documents(&ctx, &SearchRequest::default(), |doc| Ok(doc.id != "4")).await.unwrap();
        assert_eq!(visited, 5);
        assert_eq!(index.page_fetches().len(), 1);
    }

    #[tokio::test]
    async fn facets_are_visited_before_documents() {
        let (ctx, _) = context();
        let request = SearchRequest::default().with_facets(["month", "data_resource_uid"]);
        let mut facets = Vec::new();
        let mut documents = 0;
        let visited = streaming_query(
            &ctx,
            &request,
            |_| {
                documents += 1;
                Ok(true)
            },
            |facet| {
                facets.push((facet.facet_field.clone(), facet.facet_values.len(), facet.total_count()));
                Ok(true)
            },
        )
        .await
        .unwrap();
        assert_eq!(visited, 25);
        assert_eq!(documents, 25);
        assert_eq!(facets, vec![("month".to_string(), 12, 25), ("data_resource_uid".to_string(), 2, 25)]);
    }

    #[tokio::test]
    async fn facet_callback_can_skip_the_rest() {
        let (ctx, _) = context();
        let request = SearchRequest::default().with_facets(["month", "data_resource_uid"]);
        let mut seen = Vec::new();
        streaming_query(&ctx, &request, |_| Ok(true), |facet| {
            seen.push(facet.facet_field);
            Ok(false)
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["month"]);
    }
}
