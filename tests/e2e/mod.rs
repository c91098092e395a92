//! End-to-end tests: a full worker running against in-memory storage, the
//! in-process bus and a simulated provider speaking the real wire format.

mod harness;
mod integration_tests;
mod mock_provider;

pub use harness::{HarnessError, TestHarness};
pub use mock_provider::MockProvider;
