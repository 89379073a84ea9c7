//! SeaORM entity definitions for PostgreSQL database.

pub mod artifact;
pub mod cycle;
pub mod execution;
pub mod test_case;
pub mod test_set;
pub mod test_set_execution;
