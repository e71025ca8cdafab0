pub mod ledger;
pub mod payment;
pub mod price;
pub mod response;

pub use ledger::*;
pub use payment::*;
pub use price::*;
pub use response::*;
