pub mod accounts;
pub mod dispatch;
pub mod lifecycle;
pub mod matcher;
pub mod ranking;
pub mod registry;
pub mod sweeper;
