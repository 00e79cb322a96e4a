pub mod alerts;
pub mod ranking;
