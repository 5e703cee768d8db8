// Archive commands
pub mod checksum;
pub mod run;
pub mod status;
