pub mod workspace;
pub mod writers;

pub use workspace::{message_content, TestWorkspace};
pub use writers::TestWriters;
