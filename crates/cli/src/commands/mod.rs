//! Command implementations.

mod generate;
mod scan;
mod sync;
mod validate;

pub use generate::run_generate;
pub use scan::run_scan;
pub use sync::run_sync;
pub use validate::run_validate;
