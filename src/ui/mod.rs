//! Local terminal side of the session.
//!
//! - **console**: raw/line terminal wrapper and the shared, newline-normalizing display
//! - **input**: the foreground input loop with escape command handling

pub mod console;
pub mod input;

pub use console::{Console, Display, InputMode};
pub use input::{InputLoop, LineEnding, VERSION};
