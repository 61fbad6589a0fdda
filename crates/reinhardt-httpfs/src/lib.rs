//! # Reinhardt HttpFs
//!
//! Static asset serving for Reinhardt with an immutable, pre-compressed
//! in-memory cache.
//!
//! This crate provides:
//! - a [`FileSystem`](fs::FileSystem) abstraction with directory and in-memory providers
//! - a cache that reads a whole tree once and stores gzip, deflate and brotli variants
//! - a request pipeline with index documents, listings, redirects and push hints
//! - content delivery with ranges, conditional requests and attachment rate limits
//!
//! ## Features
//!
//! - **Pre-compression**: every file above the size threshold is compressed once at startup
//! - **Content Negotiation**: `Accept-Encoding` with q-values selects the stored variant
//! - **Conditional Requests**: `If-Modified-Since` and `If-None-Match` answer `304 Not Modified`
//! - **Attachments**: `Content-Disposition` downloads, optionally paced by a token bucket
//! - **Server Push**: literal and pattern based push targets for index documents
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reinhardt_httpfs::cache::CachedFs;
//! use reinhardt_httpfs::fs::DirFs;
//! use reinhardt_httpfs::service::serve;
//! use reinhardt_httpfs::{CacheOptions, FileServer, ServeOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let assets = DirFs::new("public")?;
//!     let cached = CachedFs::build(&assets, &CacheOptions::default()).await?;
//!     cached.log_report();
//!
//!     let server = FileServer::new(cached, ServeOptions::default().with_show_list(true));
//!     serve("127.0.0.1:8080".parse()?, server).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`fs`] - File system abstraction and providers
//! - [`cache`] - Cache builder, index and cached provider
//! - [`codec`] - Encodings, compression and negotiation
//! - [`config`] - Cache and serving options, TOML settings
//! - [`server`] - Request pipeline
//! - [`content`] - Ranges, validators and body streaming
//! - [`service`] - hyper integration
//! - [`error`] - Error types

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod cache;
pub mod codec;
pub mod conditional;
pub mod config;
pub mod content;
pub mod error;
pub mod fs;
pub mod listing;
pub mod message;
pub mod path;
pub mod rate;
pub mod server;
pub mod service;

// Re-export main types
pub use cache::CachedFs;
pub use codec::Encoding;
pub use config::{Attachments, CacheOptions, HttpFsSettings, ServeOptions};
pub use error::{HttpFsError, Result};
pub use message::{Body, Pusher, Request, Response};
pub use server::FileServer;
