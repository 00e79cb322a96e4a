pub mod bybit;
pub mod rate_limit;
pub mod telegram;
