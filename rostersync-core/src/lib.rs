//! Core of rostersync: turns schedule rows from a workbook into calendar events
//! and keeps the two in step across repeated sync passes.

pub mod app_config;
pub mod calendar;
pub mod commit;
pub mod config;
pub mod diff;
pub mod error;
pub mod exam;
pub mod guests;
pub mod identity;
pub mod inspect;
pub mod lock;
pub mod normalize;
pub mod schema;
pub mod settings;
pub mod sheet;
pub mod staff;
pub mod sync;
