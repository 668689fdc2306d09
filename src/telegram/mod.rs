pub mod client;
pub mod commands;
pub mod formatter;
pub mod init_data;
