//! Integration test suite run against both storage backends.
//!
//! 1. Backend selection
//! 2. Atomicity and rollback
//! 3. Registry caching
//! 4. Client providers and concurrency
//! 5. Table lifecycle scenarios

pub mod atomicity_tests;
pub mod concurrency_tests;
pub mod helpers;
pub mod registry_cache_tests;
pub mod scenario_tests;
pub mod selector_tests;
