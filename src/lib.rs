pub mod applier;
pub mod commands;
pub mod config;
pub mod doctor;
pub mod drift;
pub mod error;
pub mod fs_utils;
pub mod gitconfig;
pub mod logging;
pub mod paths;
pub mod profiles;
pub mod state;
pub mod switch;
pub mod ui;

#[cfg(test)]
pub mod test_utils;
