pub mod download;
pub mod types;
pub mod upload;

pub use types::*;

pub use download::{download_file, get_file};
pub use upload::upload_file;
