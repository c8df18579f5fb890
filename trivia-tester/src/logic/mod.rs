pub mod adapters;
pub mod dates;
pub mod reports;
pub mod scenarios;
pub mod tester;

pub use dates::resolve_date_inputs;
pub use scenarios::{get_scenario, list_scenarios};
pub use tester::*;
