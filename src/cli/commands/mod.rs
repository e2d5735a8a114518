pub mod config;
pub mod key;
pub mod on_demand;
pub mod run;
pub mod search;
