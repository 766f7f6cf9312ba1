// tests/lib.rs - Main test library entry point

// Test helper modules
mod helpers;
mod integration;

// Re-export commonly used items for convenience
pub use helpers::*;
