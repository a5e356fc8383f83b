// Configuration loading

pub mod preferences;
