//! # Vaultgate Testkit
//!
//! Testing utilities for the access-control stack:
//!
//! - **Fixtures**: a manager over an in-memory store with a fixed master
//!   key, a manual clock, and a live audit log
//! - **Generators**: proptest strategies for identifiers, keys, locators
//!   and whole grant parameter sets
//!
//! ```rust,ignore
//! use vaultgate_testkit::TestFixture;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let fx = TestFixture::new();
//!     let key = fx.grant("video-1", "user-1", "https://cdn.example/v/1", 30).await;
//!     let access = fx.manager.decrypt(&key).await.unwrap();
//!     assert_eq!(access.url, "https://cdn.example/v/1");
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{TestFixture, FIXTURE_MASTER_KEY};
pub use generators::GrantParams;
