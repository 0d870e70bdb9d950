//! Integration tests for the module host.

mod config_test;
mod helpers;
mod host_test;
mod native_exports_test;
