//! Component runtime shared by the server and the browser.
//!
//! ## Architecture
//!
//! - **Components**: cached per parent and slot, so re-renders reuse instances
//! - **Render Context**: shared state, location, storage and redirects for one page
//! - **Hydration**: comment markers let the browser adopt server markup
//! - **Routing**: first-match routes with history and link interception

pub use isoloop_pages::*;
