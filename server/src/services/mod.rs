// orderflow-server/src/services/mod.rs

//! Outbound integrations: the payment gateway and the carrier aggregator, each
//! with an HTTP client and an in-process mock for local runs.

pub mod carrier_http;
pub mod carrier_mock;
pub mod gateway_http;
pub mod payment_mock;

pub use carrier_http::HttpCarrier;
pub use carrier_mock::MockCarrier;
pub use gateway_http::HttpGateway;
pub use payment_mock::MockGateway;
