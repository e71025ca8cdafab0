pub mod checkout;
pub mod dashboard;
pub mod health;
pub mod prices;
pub mod stats;

pub use checkout::*;
pub use dashboard::*;
pub use health::*;
pub use prices::*;
pub use stats::*;
