pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod discord;
pub mod history;
pub mod live;
pub mod probe;
pub mod registry;
pub mod status_board;
pub mod storage;
