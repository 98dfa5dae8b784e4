pub mod card;
pub mod coupon;
pub mod database;
pub mod gateway;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod payments;
pub mod razorpay;
pub mod repository;
pub mod settlement;

pub use card::CardTopups;
pub use coupon::CouponService;
pub use database::Database;
pub use gateway::PaymentGateway;
pub use ledger::WalletLedger;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use payments::PaymentOrderManager;
pub use razorpay::RazorpayClient;
pub use repository::Repositories;
pub use settlement::{Settlement, SettlementDispatcher};
