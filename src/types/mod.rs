pub mod marketplace;
pub mod snapshot;
pub mod sync;
