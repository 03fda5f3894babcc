pub mod error;
pub mod config;
pub mod value;
pub mod types;
pub mod index;
pub mod query;
pub mod exec;
pub mod repository;
pub mod cli;

pub use error::{RepoError, RepoResult};
pub use repository::{Repository, ROOT_FOLDER_ID};

// Test-only printing helper: expands to eprintln! during tests and debug builds and is inert otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
