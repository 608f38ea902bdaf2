//! Data models for Ledgerly account entities.
//!
//! This module contains the structures shared by the session layer and the
//! UI shells:
//!
//! - `User`: the account owner held by the session
//! - `Profile`: the richer `/users/me` profile
//! - `AuthResponse`, `ProfileUpdate`: wire shapes for the auth endpoints

pub mod auth;
pub mod user;

pub use auth::{AuthResponse, ProfileUpdate};
pub use user::{Profile, User};
