//! Built-in request handlers

pub mod static_files;

pub use static_files::StaticFiles;
