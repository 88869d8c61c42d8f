mod discount;
pub mod iso8601;
mod key;
mod transaction;

pub use discount::*;
pub use key::*;
pub use transaction::*;
