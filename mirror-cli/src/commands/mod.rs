pub mod daemon;
pub mod diff;
pub mod init;
pub mod inspect;
pub mod profile;
pub mod status;
pub mod sync;
