pub mod image_file_reader;
pub mod report_writers;
