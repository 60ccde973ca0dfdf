pub mod history;
pub mod metrics;
pub mod trainer;
pub mod worker;
