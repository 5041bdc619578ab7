//! Session service tests.

mod helpers;
