use async_trait::async_trait;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::models::{
    Course, NewPayment, Payment, PaymentStatus, Purchase, PurchaseRecord, PurchaseStatus,
    StatusTransition, User,
};
use crate::database::store::PurchaseStore;

const RECORD_COLUMNS: &str = "p.id, p.user_id, p.course_id, p.status, p.created_at, \
     pay.id AS payment_id, pay.transaction_reference, pay.amount, \
     pay.status AS payment_status, pay.created_at AS payment_created_at";

#[derive(Debug, Clone, FromRow)]
struct CourseRow {
    id: String,
    title: String,
    price: Option<BigDecimal>,
    is_published: bool,
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct PurchaseRow {
    id: Uuid,
    user_id: String,
    course_id: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: Uuid,
    purchase_id: Uuid,
    transaction_reference: String,
    amount: BigDecimal,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Purchase left-joined with its payment
#[derive(Debug, Clone, FromRow)]
struct PurchaseRecordRow {
    id: Uuid,
    user_id: String,
    course_id: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    payment_id: Option<Uuid>,
    transaction_reference: Option<String>,
    amount: Option<BigDecimal>,
    payment_status: Option<String>,
    payment_created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = DatabaseError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        Ok(Purchase {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            status: PurchaseStatus::from_str(&row.status)?,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            purchase_id: row.purchase_id,
            transaction_reference: row.transaction_reference,
            amount: row.amount,
            status: PaymentStatus::from_str(&row.status)?,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<PurchaseRecordRow> for PurchaseRecord {
    type Error = DatabaseError;

    fn try_from(row: PurchaseRecordRow) -> Result<Self, Self::Error> {
        let payment = match (
            row.payment_id,
            row.transaction_reference,
            row.amount,
            row.payment_status,
            row.payment_created_at,
        ) {
            (Some(id), Some(reference), Some(amount), Some(status), Some(created_at)) => {
                Some(Payment {
                    id,
                    purchase_id: row.id,
                    transaction_reference: reference,
                    amount,
                    status: PaymentStatus::from_str(&status)?,
                    created_at,
                })
            }
            _ => None,
        };

        Ok(PurchaseRecord {
            purchase: Purchase {
                id: row.id,
                user_id: row.user_id,
                course_id: row.course_id,
                status: PurchaseStatus::from_str(&row.status)?,
                created_at: row.created_at,
            },
            payment,
        })
    }
}

/// Postgres-backed purchase store
pub struct PgPurchaseStore {
    pool: PgPool,
}

impl PgPurchaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_query(filter: &str) -> String {
    format!(
        "SELECT {} FROM purchases p \
         LEFT JOIN payments pay ON pay.purchase_id = p.id \
         WHERE {}",
        RECORD_COLUMNS, filter
    )
}

fn into_record(row: Option<PurchaseRecordRow>) -> Result<Option<PurchaseRecord>, DatabaseError> {
    row.map(PurchaseRecord::try_from).transpose()
}

#[async_trait]
impl PurchaseStore for PgPurchaseStore {
    async fn find_published_course(
        &self,
        course_id: &str,
    ) -> Result<Option<Course>, DatabaseError> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, title, price, is_published FROM courses \
             WHERE id = $1 AND is_published = TRUE",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|r| Course {
            id: r.id,
            title: r.title,
            price: r.price,
            is_published: r.is_published,
        }))
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|r| User {
            id: r.id,
            name: r.name,
            email: r.email,
        }))
    }

    async fn find_purchase(
        &self,
        purchase_id: Uuid,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, PurchaseRecordRow>(&record_query("p.id = $1"))
            .bind(purchase_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        into_record(row)
    }

    async fn find_purchase_for(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, PurchaseRecordRow>(&record_query(
            "p.user_id = $1 AND p.course_id = $2",
        ))
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_record(row)
    }

    async fn find_purchase_by_reference(
        &self,
        transaction_reference: &str,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, PurchaseRecordRow>(&record_query(
            "pay.transaction_reference = $1",
        ))
        .bind(transaction_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_record(row)
    }

    async fn create_purchase(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Purchase, DatabaseError> {
        let row = sqlx::query_as::<_, PurchaseRow>(
            "INSERT INTO purchases (id, user_id, course_id, status) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, course_id, status, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(course_id)
        .bind(PurchaseStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Purchase::try_from(row)
    }

    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "INSERT INTO payments (id, purchase_id, transaction_reference, amount, status) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, purchase_id, transaction_reference, amount, status, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(payment.purchase_id)
        .bind(payment.transaction_reference)
        .bind(payment.amount)
        .bind(PaymentStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Payment::try_from(row)
    }

    async fn delete_purchase(
        &self,
        purchase_id: Uuid,
        deletable: &[PurchaseStatus],
    ) -> Result<bool, DatabaseError> {
        let statuses: Vec<String> = deletable.iter().map(|s| s.as_str().to_string()).collect();

        // payments.purchase_id cascades on delete
        let result = sqlx::query("DELETE FROM purchases WHERE id = $1 AND status = ANY($2)")
            .bind(purchase_id)
            .bind(statuses)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn apply_transition(
        &self,
        transition: &StatusTransition,
    ) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM purchases WHERE id = $1 FOR UPDATE")
                .bind(transition.purchase_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        let current = match current {
            Some((status,)) => PurchaseStatus::from_str(&status)?,
            None => {
                return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "Purchase".to_string(),
                    id: transition.purchase_id.to_string(),
                }))
            }
        };

        if let Some(expected) = transition.expected {
            if current != expected {
                debug!(
                    purchase_id = %transition.purchase_id,
                    current = %current,
                    expected = %expected,
                    "Status guard failed, leaving purchase untouched"
                );
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(false);
            }
        }

        if let Some(payment_id) = transition.payment_id {
            sqlx::query("UPDATE payments SET status = $2 WHERE id = $1")
                .bind(payment_id)
                .bind(transition.payment_status.as_str())
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        }

        sqlx::query("UPDATE purchases SET status = $2 WHERE id = $1")
            .bind(transition.purchase_id)
            .bind(transition.purchase_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        super::health_check(&self.pool).await
    }
}
