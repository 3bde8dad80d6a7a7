//! Semantic search over stored messages.
//!
//! Ranks a user's prior messages by cosine similarity to a query vector via
//! `sqlite-vec`, with threshold, filtering, and pagination applied in SQL.
//! A query either returns a full ranked page plus a pagination-independent
//! total, or an error; never a silently partial result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::store::{MessageStore, parse_timestamp};

/// Result ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOrder {
    /// Most similar first.
    Similarity,
    /// Most recently created first.
    Recency,
}

/// Search parameters. Defaults: limit 10, page 1, minimum similarity 0.7,
/// no filters, similarity ordering.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchQuery {
    pub limit: usize,
    pub page: usize,
    pub min_similarity: f64,
    pub conversation_id: Option<String>,
    pub role: Option<String>,
    pub order: SearchOrder,
}

impl SearchQuery {
    /// Hard cap on page size regardless of the requested limit.
    pub const MAX_LIMIT: usize = 50;

    /// Page size after clamping to `1..=MAX_LIMIT`.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }

    /// Row offset for the requested page.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1) * self.effective_limit()
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            limit: 10,
            page: 1,
            min_similarity: 0.7,
            conversation_id: None,
            role: None,
            order: SearchOrder::Similarity,
        }
    }
}

/// One ranked message with its conversation title and similarity score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub conversation_title: String,
    /// `1 − cosine_distance(query, stored)`, in `[0, 1]`.
    pub similarity: f64,
}

/// A full page of results plus the filter-wide match count.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    /// Matches under the same filters, independent of pagination.
    pub total: usize,
}

/// Vector similarity search engine over the message store.
#[derive(Clone)]
pub struct SemanticSearchEngine {
    store: MessageStore,
}

impl SemanticSearchEngine {
    pub fn new(store: MessageStore) -> Self {
        Self { store }
    }

    /// Rank `owner_id`'s messages by similarity to `query_vector`.
    ///
    /// Only messages in conversations owned by `owner_id` are eligible, and
    /// no result below `query.min_similarity` is ever returned. Ties are
    /// broken by message creation time descending.
    pub async fn search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<SearchPage, StoreError> {
        let embedding_json = serde_json::to_string(query_vector)?;
        let limit = query.effective_limit();
        let offset = query.offset();

        let order_clause = match query.order {
            SearchOrder::Similarity => "similarity DESC, m.created_at DESC, m.id ASC",
            SearchOrder::Recency => "m.created_at DESC, m.id ASC",
        };
        let where_clause = format!(
            "c.owner_id = ?1
               AND (1.0 - vec_distance_cosine(vec_f32(me.embedding), vec_f32(?2))) >= {}
               AND (?3 IS NULL OR m.conversation_id = ?3)
               AND (?4 IS NULL OR m.role = ?4)",
            format_threshold(query.min_similarity)
        );

        let select_sql = format!(
            "SELECT m.id, m.conversation_id, m.role, m.content, m.created_at, c.title,
                    (1.0 - vec_distance_cosine(vec_f32(me.embedding), vec_f32(?2))) AS similarity
             FROM message_embeddings me
             JOIN messages m ON me.message_id = m.id
             JOIN conversations c ON m.conversation_id = c.id
             WHERE {where_clause}
             ORDER BY {order_clause}
             LIMIT {limit} OFFSET {offset}"
        );
        let count_sql = format!(
            "SELECT COUNT(*)
             FROM message_embeddings me
             JOIN messages m ON me.message_id = m.id
             JOIN conversations c ON m.conversation_id = c.id
             WHERE {where_clause}"
        );

        // Uniform Option<String> binding keeps the statement arity fixed
        // whether or not the optional filters are present.
        let owner = Some(owner_id.to_string());
        let embedding = Some(embedding_json);
        let conversation = query.conversation_id.clone();
        let role = query.role.clone();

        let page = self
            .store
            .connection()
            .call(move |conn| {
                let params = [&owner, &embedding, &conversation, &role];

                let mut stmt = conn
                    .prepare(&select_sql)?;
                let rows = stmt
                    .query_map(params, |row| {
                        Ok(SearchResult {
                            id: row.get(0)?,
                            conversation_id: row.get(1)?,
                            role: row.get(2)?,
                            content: row.get(3)?,
                            created_at: parse_timestamp(&row.get::<_, String>(4)?),
                            conversation_title: row.get(5)?,
                            similarity: row.get(6)?,
                        })
                    })?;
                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }

                let total: i64 = conn
                    .query_row(&count_sql, params, |row| row.get(0))?;

                Ok(SearchPage {
                    results,
                    total: total as usize,
                })
            })
            .await?;
        Ok(page)
    }
}

/// Render the threshold with a guaranteed decimal point so the SQL literal
/// is REAL, never INTEGER.
fn format_threshold(value: f64) -> String {
    let rendered = format!("{value}");
    if rendered.contains('.') {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_to_hard_cap() {
        let query = SearchQuery {
            limit: 500,
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), SearchQuery::MAX_LIMIT);

        let query = SearchQuery {
            limit: 0,
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), 1);
    }

    #[test]
    fn offset_follows_page_and_limit() {
        let query = SearchQuery {
            limit: 10,
            page: 3,
            ..Default::default()
        };
        assert_eq!(query.offset(), 20);

        let query = SearchQuery {
            page: 0,
            ..Default::default()
        };
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn threshold_literal_is_always_real() {
        assert_eq!(format_threshold(0.72), "0.72");
        assert_eq!(format_threshold(1.0), "1.0");
        assert_eq!(format_threshold(0.0), "0.0");
    }
}
