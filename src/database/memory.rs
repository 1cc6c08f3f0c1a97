//! Embedded store used by tests and `SKIP_EXTERNALS` runs.
//!
//! Enforces the same uniqueness rules as the Postgres schema: one purchase per
//! (user_id, course_id), one payment per purchase and unique transaction
//! references.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::models::{
    Course, NewPayment, Payment, PaymentStatus, Purchase, PurchaseRecord, PurchaseStatus,
    StatusTransition, User,
};
use crate::database::store::PurchaseStore;

#[derive(Default)]
struct Tables {
    courses: HashMap<String, Course>,
    users: HashMap<String, User>,
    purchases: HashMap<Uuid, Purchase>,
    payments: HashMap<Uuid, Payment>,
}

impl Tables {
    fn record(&self, purchase: &Purchase) -> PurchaseRecord {
        PurchaseRecord {
            purchase: purchase.clone(),
            payment: self
                .payments
                .values()
                .find(|p| p.purchase_id == purchase.id)
                .cloned(),
        }
    }
}

#[derive(Default)]
pub struct MemoryPurchaseStore {
    tables: RwLock<Tables>,
}

impl MemoryPurchaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_course(&self, course: Course) {
        self.tables
            .write()
            .await
            .courses
            .insert(course.id.clone(), course);
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id.clone(), user);
    }

    /// Number of purchase rows held for a user and course
    pub async fn purchase_count(&self, user_id: &str, course_id: &str) -> usize {
        self.tables
            .read()
            .await
            .purchases
            .values()
            .filter(|p| p.user_id == user_id && p.course_id == course_id)
            .count()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }
}

#[async_trait]
impl PurchaseStore for MemoryPurchaseStore {
    async fn find_published_course(
        &self,
        course_id: &str,
    ) -> Result<Option<Course>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .courses
            .get(course_id)
            .filter(|c| c.is_published)
            .cloned())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn find_purchase(
        &self,
        purchase_id: Uuid,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.purchases.get(&purchase_id).map(|p| tables.record(p)))
    }

    async fn find_purchase_for(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .purchases
            .values()
            .find(|p| p.user_id == user_id && p.course_id == course_id)
            .map(|p| tables.record(p)))
    }

    async fn find_purchase_by_reference(
        &self,
        transaction_reference: &str,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        let purchase_id = match tables
            .payments
            .values()
            .find(|p| p.transaction_reference == transaction_reference)
        {
            Some(payment) => payment.purchase_id,
            None => return Ok(None),
        };
        Ok(tables.purchases.get(&purchase_id).map(|p| tables.record(p)))
    }

    async fn create_purchase(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Purchase, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables
            .purchases
            .values()
            .any(|p| p.user_id == user_id && p.course_id == course_id)
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: Some("purchases_user_id_course_id_key".to_string()),
            }));
        }

        let purchase = Purchase {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            status: PurchaseStatus::Pending,
            created_at: Utc::now(),
        };
        tables.purchases.insert(purchase.id, purchase.clone());
        Ok(purchase)
    }

    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let mut tables = self.tables.write().await;
        if !tables.purchases.contains_key(&payment.purchase_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "Purchase".to_string(),
                id: payment.purchase_id.to_string(),
            }));
        }
        if tables
            .payments
            .values()
            .any(|p| p.purchase_id == payment.purchase_id)
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: Some("payments_purchase_id_key".to_string()),
            }));
        }
        if tables
            .payments
            .values()
            .any(|p| p.transaction_reference == payment.transaction_reference)
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: Some("payments_transaction_reference_key".to_string()),
            }));
        }

        let created = Payment {
            id: Uuid::new_v4(),
            purchase_id: payment.purchase_id,
            transaction_reference: payment.transaction_reference,
            amount: payment.amount,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };
        tables.payments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete_purchase(
        &self,
        purchase_id: Uuid,
        deletable: &[PurchaseStatus],
    ) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        let matches = tables
            .purchases
            .get(&purchase_id)
            .is_some_and(|p| deletable.contains(&p.status));
        if !matches {
            return Ok(false);
        }
        tables.payments.retain(|_, p| p.purchase_id != purchase_id);
        tables.purchases.remove(&purchase_id);
        Ok(true)
    }

    async fn apply_transition(
        &self,
        transition: &StatusTransition,
    ) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        let current = match tables.purchases.get(&transition.purchase_id) {
            Some(purchase) => purchase.status,
            None => {
                return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "Purchase".to_string(),
                    id: transition.purchase_id.to_string(),
                }))
            }
        };
        if let Some(expected) = transition.expected {
            if current != expected {
                return Ok(false);
            }
        }

        if let Some(payment_id) = transition.payment_id {
            if let Some(payment) = tables.payments.get_mut(&payment_id) {
                payment.status = transition.payment_status;
            }
        }
        if let Some(purchase) = tables.purchases.get_mut(&transition.purchase_id) {
            purchase.status = transition.purchase_status;
        }
        Ok(true)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
