// tests/integration/mod.rs - Integration test modules

pub mod config;
pub mod events;
pub mod http;
pub mod reconcile;
pub mod service;
pub mod status;

/// Common test setup message
pub fn print_test_header(test_name: &str, emoji: &str) {
    println!("{} Testing {}...", emoji, test_name);
}

/// Common test success message
pub fn print_test_success(test_name: &str) {
    println!("✅ {} passed", test_name);
}
