//! Utility modules.

pub mod file;

pub use file::{
    calculate_checksum, get_relative_path, is_text_file, read_file_content, source_id_for_path,
};
