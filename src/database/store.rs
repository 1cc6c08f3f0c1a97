use async_trait::async_trait;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::models::{
    Course, NewPayment, Payment, Purchase, PurchaseRecord, PurchaseStatus, StatusTransition,
    User,
};

/// Key-based access to the records the checkout core reads and writes.
///
/// Implementations must enforce uniqueness of (user_id, course_id) on
/// purchases and of purchase_id and transaction_reference on payments,
/// reporting a rejected insert as `DatabaseErrorKind::UniqueViolation`.
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Published course by id; unpublished courses are invisible
    async fn find_published_course(&self, course_id: &str)
        -> Result<Option<Course>, DatabaseError>;

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError>;

    async fn find_purchase(&self, purchase_id: Uuid)
        -> Result<Option<PurchaseRecord>, DatabaseError>;

    async fn find_purchase_for(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<PurchaseRecord>, DatabaseError>;

    async fn find_purchase_by_reference(
        &self,
        transaction_reference: &str,
    ) -> Result<Option<PurchaseRecord>, DatabaseError>;

    /// Insert a PENDING purchase
    async fn create_purchase(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Purchase, DatabaseError>;

    /// Insert a PENDING payment for an existing purchase
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, DatabaseError>;

    /// Delete a purchase together with its payment, but only while its status
    /// is one of `deletable`. Returns false when no row matched.
    async fn delete_purchase(
        &self,
        purchase_id: Uuid,
        deletable: &[PurchaseStatus],
    ) -> Result<bool, DatabaseError>;

    /// Write payment and purchase status together. Returns false when the
    /// `expected` guard did not hold and nothing was written.
    async fn apply_transition(&self, transition: &StatusTransition)
        -> Result<bool, DatabaseError>;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<(), DatabaseError>;
}

/// True when the purchase belongs to this user and course
pub(crate) fn owned_by(record: &PurchaseRecord, user_id: &str, course_id: &str) -> bool {
    record.purchase.user_id == user_id && record.purchase.course_id == course_id
}
