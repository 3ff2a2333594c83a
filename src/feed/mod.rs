pub mod calendar;
pub mod catalog;
pub mod engine;
pub mod tags;

pub use engine::{filter_items, group_by_email, EmailGroup, FilterState, ItemSource};
