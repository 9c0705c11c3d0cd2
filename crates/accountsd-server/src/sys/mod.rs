pub mod etc_files;
pub mod peer;
