pub mod assertions;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::StreamAssertion;
#[allow(unused_imports)]
pub use mocks::{Outage, RecoveringBus, UnreachableBus};
#[allow(unused_imports)]
pub use setup::{Instance, TestSetup, TestSetupBuilder};
