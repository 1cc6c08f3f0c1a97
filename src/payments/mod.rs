//! Hosted-payment gateway integration

pub mod error;
pub mod gateway;
pub mod paytabs;
pub mod types;
pub mod utils;

pub use error::{GatewayError, GatewayResult};
pub use gateway::PaymentGateway;
pub use paytabs::PayTabsGateway;
pub use types::{
    CallbackEvent, CallbackVerification, CreateTransactionRequest, CustomerDetails,
    GatewayResultCode, HostedTransaction,
};
