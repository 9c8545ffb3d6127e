pub mod geometry;
pub mod hierarchy;
pub mod metrics;
pub mod planner;
pub mod query;
