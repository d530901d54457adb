pub mod builders;
pub mod db;

pub use builders::{EntityBuilder, GroupBuilder};
pub use db::{memory_manager, TestDb};
