//! Files written on behalf of the user.
//!
//! - [`json`]: extracted records and the question/answer transcript
//!
//! The scraper registry is a separate concern, see [`crate::registry`].

pub mod json;
