pub mod export;
pub mod forecast;
