pub mod init;
pub mod maintenance;
pub mod misc;
