pub mod adblock;
pub mod challenge;
pub mod driver;

pub use adblock::AdBlocker;
pub use driver::Driver;
