//! Coverfix media layer
//!
//! Turns a cover URL into intrinsic image dimensions in two steps:
//! - [`fetch`]: retrieve the remote byte payload with a bounded timeout
//! - [`dimensions`]: sniff the payload format and decode its dimensions
//!
//! Both steps classify their failures explicitly so the orchestrator can
//! isolate them per record instead of aborting the run.

pub mod dimensions;
pub mod fetch;

pub use dimensions::{probe_dimensions, DecodeError, ImageDimensions};
pub use fetch::{FetchError, FetcherConfig, ResourceFetch, ResourceFetcher, BROWSER_USER_AGENT};
