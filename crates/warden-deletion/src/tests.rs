//! Deletion queue tests.

mod helpers;
mod requests;
mod sweep;
