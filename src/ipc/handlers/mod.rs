pub mod activities;
pub mod calc_config;
pub mod core;
pub mod grades;
pub mod scores;
pub mod students;
pub mod teams;
