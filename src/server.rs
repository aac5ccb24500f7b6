//! HTTP page rendering.

pub use isoloop_server::*;
