//! Headless Chrome driver for gridcast over the Chrome DevTools Protocol.
//!
//! # Architecture
//!
//! - **`cdp`**: DevTools socket transport: numbered calls matched to replies,
//!   and a queue of pushed events.
//! - **`launcher`**: starts (or attaches to) one browser process and hands
//!   out a cloneable [`BrowserHandle`] that creates and disposes isolated
//!   browser contexts (`Target.createBrowserContext`).
//! - **`page`**: [`PageSession`], the per-task page driver: emulation,
//!   pre-load script injection, navigation, evaluation, element measurement
//!   and clipped screenshots.
//!
//! # Example (conceptual)
//!
//! ```ignore
//! use gridcast_browser::{BrowserHandle, PageSession};
//!
//! let browser = BrowserHandle::acquire(&config.browser).await?;
//! let ctx = browser.open_context().await?;
//! let page = PageSession::attach(&ctx.page_ws_url, timeout).await?;
//! page.navigate("http://127.0.0.1:8080/templates/matrix.html", timeout).await?;
//! let bbox = page.element_box("#capture").await?;
//! let png = page.screenshot_clip(bbox.into()).await?;
//! browser.close_context(&ctx).await;
//! browser.shutdown().await;
//! ```

pub mod cdp;
pub mod error;
pub mod launcher;
pub mod page;

pub use cdp::CdpClient;
pub use error::BrowserError;
pub use launcher::{BrowserContext, BrowserHandle};
pub use page::{Clip, ElementBox, Emulation, PageSession};
