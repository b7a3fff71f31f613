//! Async Rust client for the Kawaii API.
//!
//! Kawaii serves anime reaction images and GIFs by category. Each call is a
//! single `GET <base>/<category>/<sub>` returning either a JSON object with a
//! `response` field or the raw URL as text.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use kawaii::{Category, Client, GetOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kawaii::Error> {
//!     let client = Client::builder().token("your-token").build()?;
//!
//!     let url = client
//!         .get(Category::Gif, "hug", GetOptions::default().filter([1]))
//!         .await?;
//!
//!     println!("{}", url);
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;
mod version;

pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
pub use types::{Category, GetOptions, ResponseType};
pub use version::SDK_VERSION;
