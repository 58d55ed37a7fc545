//! Aurora Core - Shared domain types and pure storefront logic.
//!
//! This crate provides the types and the side-effect-free rules used across
//! all Aurora components:
//! - `storefront` - Client state (cart, wishlist, session, checkout)
//! - `cli` - Command-line shell over the storefront client
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no remote
//! stores, no HTTP clients. Everything here is deterministic and can be tested
//! without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices and statuses
//! - [`product`] - Catalog products
//! - [`cart`] - Line items, identity keys and the high-water-mark merge
//! - [`wishlist`] - Wishlist entries
//! - [`filter`] - Product filter predicate
//! - [`checkout`] - Shipping, coupons and order descriptions

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod filter;
pub mod product;
pub mod types;
pub mod wishlist;

pub use cart::{LineItem, LineKey};
pub use filter::ProductFilter;
pub use product::Product;
pub use types::*;
pub use wishlist::WishlistEntry;
