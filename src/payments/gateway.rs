use crate::payments::error::GatewayResult;
use crate::payments::types::{
    CallbackEvent, CallbackVerification, CreateTransactionRequest, GatewayResultCode,
    HostedTransaction,
};
use async_trait::async_trait;

/// Hosted-payment gateway used by the checkout core
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted transaction. Never retried by implementations.
    async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> GatewayResult<HostedTransaction>;

    /// Ask the gateway for the current result of a transaction
    async fn verify_transaction(&self, transaction_reference: &str)
        -> GatewayResult<GatewayResultCode>;

    fn verify_callback(&self, payload: &[u8], signature: &str)
        -> GatewayResult<CallbackVerification>;

    fn parse_callback(&self, payload: &[u8]) -> GatewayResult<CallbackEvent>;

    fn name(&self) -> &'static str;
}
