//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` work.

pub mod discount;
pub mod discount_code;
pub mod event;
pub mod organizer;

pub use self::discount::*;
pub use self::discount_code::*;
pub use self::event::*;
pub use self::organizer::*;
