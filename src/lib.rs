pub mod api;
pub mod bitbucket;
pub mod config;
pub mod filter;
pub mod mcp;
pub mod review;
pub mod router;
pub mod shutdown;
pub mod source;
