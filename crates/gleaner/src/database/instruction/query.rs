//! Read-only lookups over the lifecycle store.
//!
//! Window-scoped criteria compare the fixed-width `published` strings lexically against the
//! window start rendered in the same layout.

use super::*;
use crate::digest::SharePolicy;

/// Represents the different ways to select items.
#[derive(Debug, Clone)]
pub enum QueryCriteria {
  /// A single item by identifier
  Id(String),
  /// Items published at or after the boundary
  PublishedSince(DateTime<Utc>),
  /// Unsummarized items published at or after the boundary
  PendingSummary(DateTime<Utc>),
  /// Summarized items inside the window that the share policy admits
  ReadyToShare { since: DateTime<Utc>, policy: SharePolicy },
  /// Every tracked item
  All,
}

/// Available fields for ordering query results
#[derive(Debug, Clone, Copy)]
pub enum OrderField {
  /// Order by publication timestamp
  Published,
  /// Order by identifier
  Id,
}

impl OrderField {
  fn as_sql_str(&self) -> &'static str {
    match self {
      OrderField::Published => "published",
      OrderField::Id => "id",
    }
  }
}

/// A query for retrieving items from the store
#[derive(Debug, Clone)]
pub struct Query {
  criteria:   QueryCriteria,
  order_by:   Option<OrderField>,
  descending: bool,
}

impl Query {
  /// Creates a new query with the given criteria
  pub fn new(criteria: QueryCriteria) -> Self {
    Self { criteria, order_by: None, descending: false }
  }

  /// Looks up one item; the result holds zero or one record
  pub fn by_id(id: &str) -> Self { Self::new(QueryCriteria::Id(id.to_string())) }

  /// Items published at or after `since`
  pub fn published_since(since: DateTime<Utc>) -> Self {
    Self::new(QueryCriteria::PublishedSince(since)).order_by(OrderField::Published)
  }

  /// Items inside the window that still need a summary
  pub fn pending_summary(since: DateTime<Utc>) -> Self {
    Self::new(QueryCriteria::PendingSummary(since)).order_by(OrderField::Published)
  }

  /// Items eligible for a digest, newest first
  pub fn ready_to_share(since: DateTime<Utc>, policy: SharePolicy) -> Self {
    Self::new(QueryCriteria::ReadyToShare { since, policy })
      .order_by(OrderField::Published)
      .descending()
  }

  /// Every tracked item
  pub fn list_all() -> Self { Self::new(QueryCriteria::All).order_by(OrderField::Id) }

  /// Sets the field to order results by
  pub fn order_by(mut self, field: OrderField) -> Self {
    self.order_by = Some(field);
    self
  }

  /// Sets the order to descending (default is ascending)
  pub fn descending(mut self) -> Self {
    self.descending = true;
    self
  }

  fn build_sql(&self) -> (String, Vec<String>) {
    let (filter, params) = match &self.criteria {
      QueryCriteria::Id(id) => ("WHERE id = ?1".to_string(), vec![id.clone()]),
      QueryCriteria::PublishedSince(since) =>
        ("WHERE published >= ?1".to_string(), vec![to_store_timestamp(since)]),
      QueryCriteria::PendingSummary(since) =>
        ("WHERE summarized = 0 AND published >= ?1".to_string(), vec![to_store_timestamp(since)]),
      QueryCriteria::ReadyToShare { since, policy } => {
        let shared = match policy {
          SharePolicy::Unshared => " AND shared = 0",
          SharePolicy::All => "",
        };
        (
          format!("WHERE summarized = 1 AND published >= ?1{shared}"),
          vec![to_store_timestamp(since)],
        )
      },
      QueryCriteria::All => (String::new(), Vec::new()),
    };

    let mut sql = format!("SELECT {ITEM_COLUMNS} FROM items {filter}");
    if let Some(order_field) = &self.order_by {
      let direction = if self.descending { "DESC" } else { "ASC" };
      // Tie-break on id so equal timestamps come back in a stable order.
      sql.push_str(&format!(" ORDER BY {} {direction}, id ASC", order_field.as_sql_str()));
    }
    (sql, params)
  }
}

#[async_trait]
impl DatabaseInstruction for Query {
  type Output = Vec<ItemRecord>;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let (sql, params) = self.build_sql();
    trace!("Running query: {sql}");

    let items = db
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let items = stmt
          .query_map(params_from_iter(params.iter()), item_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
      })
      .await?;

    Ok(items)
  }
}
