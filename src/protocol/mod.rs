pub mod chat;
pub(crate) mod error_shapes;
