pub mod config;
pub mod constants;
pub mod daily_processing;
pub mod daily_result;
pub mod numerics;
pub mod overlap_errors;
pub mod pre_checks;
pub mod process_checks;
pub mod profiles;
pub mod sample_sorter;
pub mod temperature_model;
pub mod time;
