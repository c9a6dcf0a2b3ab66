pub mod alert;
pub mod quote;

pub use alert::{Alert, Condition};
pub use quote::{PriceQuote, QuoteKey};
