//! Role engine tests.

mod demotion;
mod helpers;
