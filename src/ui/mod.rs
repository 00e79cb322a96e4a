pub mod bot;
pub mod chart;
pub mod commands;
pub mod format;
