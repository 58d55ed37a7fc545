//! Aurora storefront client library.
//!
//! Client-side state for the Aurora store: a cart that lives on the device
//! and mirrors to a remote row store while a user is signed in, a wishlist
//! kept only in the remote store, and the session, profile, order and
//! checkout services around them. [`state::AppState`] wires everything
//! together for a front end.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod local;
pub mod notice;
pub mod orders;
pub mod profile;
pub mod remote;
pub mod session;
pub mod state;
pub mod wishlist;

pub use state::{AppState, Collaborators};
