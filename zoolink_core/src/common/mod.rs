pub mod config_def;
