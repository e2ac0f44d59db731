//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Image launched when no override is configured.
pub const DEFAULT_IMAGE: &str = "ubuntu:22.04";

/// LXD client binary used when no override is configured.
pub const DEFAULT_LXC_BIN: &str = "lxc";
