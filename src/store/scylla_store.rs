use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use scylla::value::{CqlValue, Row};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus, PaymentStatus};
use super::order_store::{OrderFilter, OrderStore, StoreError};

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// One row per order. The full order is kept as a JSON document next to the
// columns the store needs to reason about:
//
//   version         - compared by lightweight transactions (IF version = ?)
//   status          - secondary index for dashboard polling
//   payment_status  - written only by the effect dispatcher, so it lives in
//                     its own column and survives lifecycle writes
//
// ============================================================================

const CREATE_ORDERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS orders (
    id uuid PRIMARY KEY,
    version bigint,
    status text,
    payment_status text,
    document text
)";

const CREATE_STATUS_INDEX: &str = "CREATE INDEX IF NOT EXISTS orders_by_status ON orders (status)";

pub struct ScyllaOrderStore {
    session: Arc<Session>,
}

impl ScyllaOrderStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Connect, create the keyspace if needed and make sure the schema exists.
    pub async fn connect(nodes: &[String], keyspace: &str) -> anyhow::Result<Self> {
        tracing::info!(nodes = ?nodes, keyspace = %keyspace, "Connecting to ScyllaDB");

        let session: Session = SessionBuilder::new().known_nodes(nodes).build().await?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    keyspace
                ),
                &[],
            )
            .await?;

        session.use_keyspace(keyspace, false).await?;

        let store = Self::new(Arc::new(session));
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        self.session.query_unpaged(CREATE_ORDERS_TABLE, &[]).await?;
        self.session.query_unpaged(CREATE_STATUS_INDEX, &[]).await?;
        Ok(())
    }

    async fn current_version(&self, order_id: Uuid) -> Result<Option<u64>, StoreError> {
        let result = self
            .session
            .query_unpaged("SELECT version FROM orders WHERE id = ?", (order_id,))
            .await
            .map_err(StoreError::backend)?;

        let row = result
            .into_rows_result()
            .map_err(StoreError::backend)?
            .maybe_first_row::<(i64,)>()
            .map_err(StoreError::backend)?;

        Ok(row.map(|(version,)| version as u64))
    }

    async fn payment_status(&self, order_id: Uuid) -> Result<PaymentStatus, StoreError> {
        let result = self
            .session
            .query_unpaged("SELECT payment_status FROM orders WHERE id = ?", (order_id,))
            .await
            .map_err(StoreError::backend)?;

        let (payment_status,) = result
            .into_rows_result()
            .map_err(StoreError::backend)?
            .maybe_first_row::<(String,)>()
            .map_err(StoreError::backend)?
            .ok_or(StoreError::NotFound(order_id))?;

        parse_payment_status(&payment_status)
    }

    async fn query_documents(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let result = match status {
            Some(status) => {
                self.session
                    .query_unpaged(
                        "SELECT document, payment_status FROM orders WHERE status = ?",
                        (status.as_str(),),
                    )
                    .await
            }
            None => {
                self.session
                    .query_unpaged("SELECT document, payment_status FROM orders", &[])
                    .await
            }
        }
        .map_err(StoreError::backend)?;

        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;

        let mut orders = Vec::new();
        for row in rows_result.rows::<(String, String)>().map_err(StoreError::backend)? {
            let (document, payment_status) = row.map_err(StoreError::backend)?;
            orders.push(decode_order(&document, &payment_status)?);
        }

        Ok(orders)
    }
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let document = encode_order(order)?;

        let result = self
            .session
            .query_unpaged(
                "INSERT INTO orders (id, version, status, payment_status, document)
                 VALUES (?, ?, ?, ?, ?) IF NOT EXISTS",
                (
                    order.id,
                    order.version as i64,
                    order.status.as_str(),
                    order.payment_status.as_str(),
                    document,
                ),
            )
            .await
            .map_err(StoreError::backend)?;

        if !lwt_applied(result)? {
            return Err(StoreError::AlreadyExists(order.id));
        }

        tracing::info!(order_id = %order.id, "Stored new order");
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT document, payment_status FROM orders WHERE id = ?",
                (order_id,),
            )
            .await
            .map_err(StoreError::backend)?;

        let (document, payment_status) = result
            .into_rows_result()
            .map_err(StoreError::backend)?
            .maybe_first_row::<(String, String)>()
            .map_err(StoreError::backend)?
            .ok_or(StoreError::NotFound(order_id))?;

        decode_order(&document, &payment_status)
    }

    async fn compare_and_swap(&self, expected_version: u64, updated: &Order) -> Result<Order, StoreError> {
        let document = encode_order(updated)?;

        let result = self
            .session
            .query_unpaged(
                "UPDATE orders SET version = ?, status = ?, document = ?
                 WHERE id = ? IF version = ?",
                (
                    updated.version as i64,
                    updated.status.as_str(),
                    document,
                    updated.id,
                    expected_version as i64,
                ),
            )
            .await
            .map_err(StoreError::backend)?;

        if lwt_applied(result)? {
            let mut committed = updated.clone();
            committed.payment_status = self.payment_status(updated.id).await?;
            return Ok(committed);
        }

        match self.current_version(updated.id).await? {
            Some(actual) => Err(StoreError::VersionConflict {
                order_id: updated.id,
                expected: expected_version,
                actual,
            }),
            None => Err(StoreError::NotFound(updated.id)),
        }
    }

    async fn set_payment_status(&self, order_id: Uuid, status: PaymentStatus) -> Result<Order, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "UPDATE orders SET payment_status = ? WHERE id = ? IF EXISTS",
                (status.as_str(), order_id),
            )
            .await
            .map_err(StoreError::backend)?;

        if !lwt_applied(result)? {
            return Err(StoreError::NotFound(order_id));
        }

        self.get(order_id).await
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut orders = match filter.statuses {
            Some(ref statuses) => {
                let mut found = Vec::new();
                for status in statuses {
                    found.extend(self.query_documents(Some(*status)).await?);
                }
                found
            }
            None => self.query_documents(None).await?,
        };

        orders.retain(|order| filter.matches(order));
        orders.sort_by_key(|o| o.created_at);

        tracing::debug!(count = orders.len(), "Listed orders");
        Ok(orders)
    }
}

/// First column of a lightweight transaction result is `[applied]`.
fn lwt_applied(result: QueryResult) -> Result<bool, StoreError> {
    let row = result
        .into_rows_result()
        .map_err(StoreError::backend)?
        .first_row::<Row>()
        .map_err(StoreError::backend)?;

    match row.columns.first() {
        Some(Some(CqlValue::Boolean(applied))) => Ok(*applied),
        _ => Err(StoreError::Backend("missing [applied] column in LWT result".to_string())),
    }
}

fn encode_order(order: &Order) -> Result<String, StoreError> {
    Ok(serde_json::to_string(order)?)
}

fn decode_order(document: &str, payment_status: &str) -> Result<Order, StoreError> {
    let mut order: Order = serde_json::from_str(document)?;
    order.payment_status = parse_payment_status(payment_status)?;
    Ok(order)
}

fn parse_payment_status(value: &str) -> Result<PaymentStatus, StoreError> {
    PaymentStatus::parse(value)
        .ok_or_else(|| StoreError::Backend(format!("unknown payment status '{}'", value)))
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Statements against a live cluster are exercised by the demo binary with
// KITCHEN_FLOW_STORE=scylla; these tests cover the row encoding.
//
// ============================================================================
