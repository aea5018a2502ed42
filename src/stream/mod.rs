//! Streaming transform: line reassembly, frame classification, reasoning
//! splice and the downstream body that ties them together.

pub mod aggregate;
pub mod body;
pub mod frame;
pub mod lines;
pub mod pipeline;
pub mod splice;

pub use aggregate::{aggregate_message, aggregate_record};
pub use body::spliced_stream;
pub use frame::{classify, Frame};
pub use lines::LineReassembler;
pub use pipeline::FramePipeline;
pub use splice::{ReasoningMode, ReasoningSplicer, SpliceState, CLOSE_DELIMITER, OPEN_DELIMITER};
