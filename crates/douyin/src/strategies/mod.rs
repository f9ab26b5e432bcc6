//! The concrete extraction strategies, in default preference order.

pub mod api;
pub mod browser;
pub mod html;

pub use api::ApiStrategy;
pub use browser::{BrowserStrategy, browser_available};
pub use html::HtmlStrategy;
