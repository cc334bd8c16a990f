//! Mock sessions and canned server states.

mod scenarios;
mod session;

#[cfg(test)]
pub(crate) use scenarios::*;
pub use session::{MockFactory, MockResponse, MockSession};
