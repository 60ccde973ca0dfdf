pub mod activation;
pub mod network;
pub mod optimizer;
