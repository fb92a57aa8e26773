pub mod resolver_tests;
pub mod loader_tests;
