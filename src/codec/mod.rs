pub mod weight_file;

pub use weight_file::{expected_line_count, read_weights, write_weights, Topology};
