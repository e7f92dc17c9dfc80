pub mod batch;
pub mod check;
pub mod config;
pub mod run;
pub mod watch;

mod display;
