// Library interface for newsdesk modules
// This allows tests and the binary to import modules

pub mod accounts;
pub mod bookmarks;
pub mod chunking;
pub mod error;
pub mod llm;
pub mod news;
pub mod pipeline;
pub mod scraping;
pub mod server;
pub mod storage;
