pub mod aggregate;
pub mod preprocessing;
pub mod records;
pub mod scaler;
