//! # Douyin Parser
//!
//! A library for resolving Douyin share inputs into playable media records.
//! Accepts share text, short links, full web URLs or bare IDs and extracts
//! watermark-free video, image-gallery and music addresses.
//!
//! ## Features
//!
//! - Share-text and short-link resolution to canonical video URLs
//! - Detail-API access with forged request tokens (msToken, X-Bogus, ttwid)
//! - Headless-browser extraction with CDP network sniffing
//! - Embedded-state HTML scraping (RENDER_DATA, SIGI_STATE, JSON-LD, og:)
//! - A common strategy trait so callers can order and fail over freely

pub mod apis;
pub mod error;
pub(crate) mod models;
pub mod record;
pub mod resolver;
pub mod session;
pub mod strategies;
pub mod strategy;
pub mod tokens;

pub use error::ParseError;
pub use record::{AuthorInfo, RecordStats, VideoRecord, strip_watermark};
pub use resolver::{ResolvedTarget, Resolver, extract_aweme_id, extract_share_url};
pub use strategy::{ParseContext, ParseStrategy, StrategyKind};

pub use strategies::{ApiStrategy, BrowserStrategy, HtmlStrategy, browser_available};
