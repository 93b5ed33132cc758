pub mod assemble;
pub mod cli;
pub mod crawl;
pub mod db;
pub mod error;
pub mod fetch;
pub mod html;
pub mod model;
pub mod page;
pub mod project;
pub mod query;
