pub mod attempts;
pub mod init;
pub mod serve;
pub mod validate;
