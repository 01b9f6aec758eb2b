pub mod auto_splice;
pub mod colors;
