//! Foreign-function boundary: the C ABI exported to a managed host and the
//! guards that keep panics on the Rust side.

pub mod abi;
pub mod exports;
pub mod safety;
