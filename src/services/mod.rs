pub mod analytics;
pub mod finalizer;
pub mod initiator;
pub mod monitor;
pub mod price_oracle;
pub mod session;
pub mod storage;
pub mod xrpl;

pub use analytics::Analytics;
pub use finalizer::{FinalizeParams, PaymentFinalizer, VerifyPaymentResponse};
pub use initiator::{InitiateOutcome, PaymentInitiator};
pub use monitor::{LedgerSource, MonitorService, MonitorState, MonitoringSession};
pub use price_oracle::PriceOracle;
pub use session::{SessionState, SessionStore};
pub use storage::StorageService;
pub use xrpl::XrplService;
