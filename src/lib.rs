pub mod config;
pub mod dataset;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod textutil;
pub mod transform;
pub mod vocabulary;
pub mod workbook;
