//! OpenSearch-backed [`ChunkStore`].
//!
//! Translates the four query shapes into OpenSearch query DSL over an index
//! whose documents look like [`Chunk`]:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | vector search | `knn` on `embedding_vector` with `min_score` and a `terms` file-type filter |
//! | term search | `multi_match` with `operator`, optional `fuzziness: AUTO`, and `content` highlighting |
//! | pattern search | `regexp` on `store.pattern_field`, wrapped in `.*( ).*` so it may match anywhere in a term |
//! | file scan | `term` on `file_name` sorted by `chunk_id`, paged with the scroll API |
//!
//! `embedding_vector` is excluded from every `_source` so hits stay small.
//!
//! # Errors
//!
//! Connection failures, timeouts, and 5xx responses map to
//! [`RetrievalError::BackendUnavailable`]. Any other non-2xx response means
//! the cluster understood and refused the request, and maps to
//! [`RetrievalError::QueryRejected`]. Nothing is retried.
//!
//! `regexp` matches whole terms, and Lucene regular expressions are not
//! Rust's. The pattern is translated to the Lucene subset described in
//! [`lucene`] and searched with `flags: NONE`. Candidates are re-scanned
//! locally with the Rust pattern before anything is reported. Point
//! `pattern_field` at a keyword or `wildcard` copy of `content` so a
//! pattern can span tokens.

mod lucene;

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use chunkseek_core::error::{Result, RetrievalError};
use chunkseek_core::models::{Chunk, ChunkHit, ChunkPage, ScanCursor};
use chunkseek_core::store::{ChunkStore, PatternQuery, TermQuery, VectorQuery};

use crate::config::StoreConfig;

const SOURCE_EXCLUDES: [&str; 1] = ["embedding_vector"];

pub struct OpenSearchStore {
    client: reqwest::Client,
    base_url: String,
    index: String,
    scroll_keep_alive: String,
    vector_dims: Option<usize>,
    file_type_field: String,
    pattern_field: String,
    credentials: Option<(String, Option<String>)>,
}

impl OpenSearchStore {
    /// Build a store over a shared HTTP client.
    ///
    /// The client carries the request timeout; the password, if any, is read
    /// from the environment variable named by `store.password_env`.
    pub fn new(client: reqwest::Client, config: &StoreConfig) -> Self {
        let credentials = config.username.as_ref().map(|user| {
            let password = std::env::var(&config.password_env).ok();
            (user.clone(), password)
        });
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            scroll_keep_alive: config.scroll_keep_alive.clone(),
            vector_dims: config.vector_dims,
            file_type_field: config.file_type_field.clone(),
            pattern_field: config.pattern_field.clone(),
            credentials,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| RetrievalError::store_unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let reason = match response.text().await {
            Ok(body) => error_reason(&body),
            Err(e) => unreadable_body_reason(&e),
        };
        if status.is_server_error() {
            Err(RetrievalError::store_unavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                reason
            )))
        } else {
            Err(RetrievalError::QueryRejected {
                status: status.as_u16(),
                message: reason,
            })
        }
    }

    async fn search(&self, body: Value) -> Result<SearchResponse> {
        let path = format!("/{}/_search", self.index);
        let response = self
            .send(self.request(Method::POST, &path).json(&body))
            .await?;
        parse_response(response).await
    }

    fn page(&self, response: SearchResponse, has_more: bool) -> ChunkPage {
        ChunkPage {
            chunks: response.hits.hits.into_iter().map(|h| h.source).collect(),
            cursor: response.scroll_id.map(ScanCursor),
            has_more,
        }
    }
}

async fn parse_response(response: reqwest::Response) -> Result<SearchResponse> {
    response
        .json::<SearchResponse>()
        .await
        .map_err(|e| RetrievalError::store_unavailable(format!("malformed search response: {}", e)))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: Chunk,
    #[serde(default)]
    highlight: HashMap<String, Vec<String>>,
}

impl RawHit {
    fn into_hit(mut self) -> ChunkHit {
        ChunkHit {
            score: self.score.unwrap_or(0.0),
            highlights: self.highlight.remove("content").unwrap_or_default(),
            chunk: self.source,
        }
    }
}

/// Best human-readable reason from an OpenSearch error body.
fn error_reason(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let reason = parsed.as_ref().and_then(|v| {
        let error = v.get("error")?;
        error
            .pointer("/root_cause/0/reason")
            .or_else(|| error.get("reason"))
            .or(Some(error))
            .and_then(|r| r.as_str())
            .map(str::to_string)
    });
    reason.unwrap_or_else(|| body.chars().take(500).collect())
}

fn unreadable_body_reason(err: &dyn std::fmt::Display) -> String {
    format!("response body unreadable: {}", err)
}

fn file_type_filter(field: &str, file_types: &[String]) -> Option<Value> {
    (!file_types.is_empty()).then(|| json!({ "terms": { field: file_types } }))
}

pub(crate) fn knn_body(query: &VectorQuery<'_>, file_type_field: &str) -> Value {
    let mut knn = json!({
        "vector": query.vector,
        "k": query.k,
    });
    if let Some(filter) = file_type_filter(file_type_field, query.file_types) {
        knn["filter"] = filter;
    }
    json!({
        "size": query.k,
        "min_score": query.score_floor,
        "_source": { "excludes": SOURCE_EXCLUDES },
        "query": { "knn": { "embedding_vector": knn } },
    })
}

pub(crate) fn multi_match_body(query: &TermQuery<'_>) -> Value {
    let mut multi_match = json!({
        "query": query.query,
        "fields": query.fields,
        "operator": query.operator.as_str(),
    });
    if query.fuzzy {
        multi_match["fuzziness"] = json!("AUTO");
    }
    json!({
        "size": query.top_k,
        "_source": { "excludes": SOURCE_EXCLUDES },
        "query": { "multi_match": multi_match },
        "highlight": {
            "pre_tags": ["<em>"],
            "post_tags": ["</em>"],
            "fields": { "content": {} },
        },
    })
}

pub(crate) fn regexp_body(
    query: &PatternQuery<'_>,
    pattern_field: &str,
    file_type_field: &str,
) -> Value {
    let mut case_insensitive = !query.case_sensitive;
    let value = match lucene::translate(query.pattern) {
        Some((pattern, inline_case_insensitive)) => {
            case_insensitive |= inline_case_insensitive;
            format!(".*({}).*", pattern)
        }
        None => ".*".to_string(),
    };
    let mut bool_query = json!({
        "must": [{
            "regexp": {
                pattern_field: {
                    "value": value,
                    "flags": "NONE",
                    "case_insensitive": case_insensitive,
                }
            }
        }]
    });
    if let Some(filter) = file_type_filter(file_type_field, query.file_types) {
        bool_query["filter"] = json!([filter]);
    }
    json!({
        "size": query.limit,
        "_source": { "excludes": SOURCE_EXCLUDES },
        "query": { "bool": bool_query },
    })
}

pub(crate) fn scan_body(file_name: &str, page_size: usize) -> Value {
    json!({
        "size": page_size,
        "sort": [{ "chunk_id": "asc" }],
        "_source": { "excludes": SOURCE_EXCLUDES },
        "query": { "term": { "file_name": file_name } },
    })
}

#[async_trait]
impl ChunkStore for OpenSearchStore {
    fn vector_dims(&self) -> Option<usize> {
        self.vector_dims
    }

    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<ChunkHit>> {
        let response = self.search(knn_body(query, &self.file_type_field)).await?;
        Ok(response.hits.hits.into_iter().map(RawHit::into_hit).collect())
    }

    async fn term_search(&self, query: &TermQuery<'_>) -> Result<Vec<ChunkHit>> {
        let response = self.search(multi_match_body(query)).await?;
        Ok(response.hits.hits.into_iter().map(RawHit::into_hit).collect())
    }

    async fn pattern_search(&self, query: &PatternQuery<'_>) -> Result<Vec<ChunkHit>> {
        let response = self.search(regexp_body(query, &self.pattern_field, &self.file_type_field)).await?;
        Ok(response.hits.hits.into_iter().map(RawHit::into_hit).collect())
    }

    async fn scan_file(&self, file_name: &str, page_size: usize) -> Result<ChunkPage> {
        let path = format!("/{}/_search?scroll={}", self.index, self.scroll_keep_alive);
        let response = self
            .send(
                self.request(Method::POST, &path)
                    .json(&scan_body(file_name, page_size)),
            )
            .await?;
        let response = parse_response(response).await?;
        let has_more = response.hits.hits.len() >= page_size;
        debug!(file_name, hits = response.hits.hits.len(), "scroll opened");
        Ok(self.page(response, has_more))
    }

    async fn scan_next(&self, cursor: &ScanCursor) -> Result<ChunkPage> {
        let body = json!({
            "scroll": self.scroll_keep_alive,
            "scroll_id": cursor.0,
        });
        let response = self
            .send(self.request(Method::POST, "/_search/scroll").json(&body))
            .await?;
        let mut response = parse_response(response).await?;
        // The cluster may omit the id when it has not changed.
        if response.scroll_id.is_none() {
            response.scroll_id = Some(cursor.0.clone());
        }
        let has_more = !response.hits.hits.is_empty();
        Ok(self.page(response, has_more))
    }

    async fn release_scan(&self, cursor: &ScanCursor) -> Result<()> {
        let body = json!({ "scroll_id": [cursor.0] });
        match self
            .send(self.request(Method::DELETE, "/_search/scroll").json(&body))
            .await
        {
            // Already expired.
            Err(RetrievalError::QueryRejected { status: 404, .. }) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkseek_core::store::Operator;

    #[test]
    fn knn_body_filters_and_floors() {
        let types = vec!["rs".to_string()];
        let vector = [0.5f32, 0.25];
        let body = knn_body(
            &VectorQuery {
                vector: &vector,
                k: 7,
                score_floor: 0.6,
                file_types: &types,
            },
            "metadata.file_type",
        );
        assert_eq!(body["size"], 7);
        assert_eq!(body["min_score"], 0.6);
        assert_eq!(body["query"]["knn"]["embedding_vector"]["k"], 7);
        assert_eq!(
            body["query"]["knn"]["embedding_vector"]["filter"]["terms"]["metadata.file_type"],
            json!(["rs"])
        );
        assert_eq!(body["_source"]["excludes"], json!(["embedding_vector"]));
    }

    #[test]
    fn knn_body_without_filter() {
        let body = knn_body(
            &VectorQuery {
                vector: &[1.0],
                k: 3,
                score_floor: 0.0,
                file_types: &[],
            },
            "metadata.file_type",
        );
        assert!(body["query"]["knn"]["embedding_vector"].get("filter").is_none());
    }

    #[test]
    fn multi_match_body_passes_operator_and_fuzziness() {
        let fields = vec!["content^2".to_string(), "file_name".to_string()];
        let body = multi_match_body(&TermQuery {
            query: "retry policy",
            fields: &fields,
            operator: Operator::And,
            fuzzy: true,
            top_k: 5,
        });
        let mm = &body["query"]["multi_match"];
        assert_eq!(mm["operator"], "and");
        assert_eq!(mm["fuzziness"], "AUTO");
        assert_eq!(mm["fields"], json!(["content^2", "file_name"]));
        assert_eq!(body["highlight"]["pre_tags"], json!(["<em>"]));
    }

    #[test]
    fn regexp_body_case_flag() {
        let body = regexp_body(
            &PatternQuery {
                pattern: "todo.*",
                file_types: &[],
                case_sensitive: false,
                limit: 100,
            },
            "content",
            "metadata.file_type",
        );
        let regexp = &body["query"]["bool"]["must"][0]["regexp"]["content"];
        assert_eq!(regexp["value"], ".*(todo.*).*");
        assert_eq!(regexp["flags"], "NONE");
        assert_eq!(regexp["case_insensitive"], true);
        assert_eq!(body["size"], 100);
    }

    #[test]
    fn regexp_body_translates_pattern() {
        let types = vec!["rs".to_string()];
        let body = regexp_body(
            &PatternQuery {
                pattern: r"(?i)^fn\s+handle_\d+$",
                file_types: &types,
                case_sensitive: true,
                limit: 20,
            },
            "content.raw",
            "metadata.file_type",
        );
        let bool_query = &body["query"]["bool"];
        let regexp = &bool_query["must"][0]["regexp"]["content.raw"];
        assert_eq!(
            regexp["value"],
            ".*(()fn[ \t\n\r\u{b}\u{c}]+handle\\_[0-9]+()).*"
        );
        assert_eq!(regexp["case_insensitive"], true);
        assert!(bool_query["must"][0]["regexp"].get("content").is_none());
        assert_eq!(
            bool_query["filter"][0]["terms"]["metadata.file_type"],
            json!(["rs"])
        );
    }

    #[test]
    fn regexp_body_matches_everything_when_untranslatable() {
        let body = regexp_body(
            &PatternQuery {
                pattern: "(?x) fn \\s+ main",
                file_types: &[],
                case_sensitive: true,
                limit: 5,
            },
            "content",
            "metadata.file_type",
        );
        let regexp = &body["query"]["bool"]["must"][0]["regexp"]["content"];
        assert_eq!(regexp["value"], ".*");
        assert_eq!(regexp["case_insensitive"], false);
    }

    #[test]
    fn scan_body_sorts_by_chunk_id() {
        let body = scan_body("src/main.rs", 500);
        assert_eq!(body["query"]["term"]["file_name"], "src/main.rs");
        assert_eq!(body["sort"], json!([{ "chunk_id": "asc" }]));
    }

    #[test]
    fn error_reason_prefers_root_cause() {
        let body = r#"{"error":{"root_cause":[{"reason":"bad regex"}],"reason":"all shards failed"},"status":400}"#;
        assert_eq!(error_reason(body), "bad regex");
        assert_eq!(error_reason(r#"{"error":"plain"}"#), "plain");
        assert_eq!(error_reason("gateway down"), "gateway down");
    }
}
