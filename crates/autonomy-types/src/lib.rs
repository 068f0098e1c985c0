pub mod budget;
pub mod collaborators;
pub mod goal;
pub mod lock;
pub mod outcome;
pub mod project;
pub mod scheduled_job;
pub mod task;

pub use budget::*;
pub use collaborators::*;
pub use goal::*;
pub use lock::*;
pub use outcome::*;
pub use project::*;
pub use scheduled_job::*;
pub use task::*;

/// All monetary amounts in the autonomy core are decimal with 4 fractional
/// digits, never floating point, to avoid accumulating rounding error
/// across the budget ledger.
pub type Usd = rust_decimal::Decimal;
