pub mod content;
pub mod cron;
pub mod dispatch;
pub mod poisson;
