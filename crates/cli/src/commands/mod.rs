//! Subcommand implementations.
//!
//! Command output goes to stdout; notices and logs go to stderr.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod wishlist;
