pub mod file_filter;
pub mod file_size;
