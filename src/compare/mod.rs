pub mod engine;
pub mod list_source;

pub use engine::{compare_list, ComparisonResult};
pub use list_source::{ListItem, ListItemSource, PgListSource};
