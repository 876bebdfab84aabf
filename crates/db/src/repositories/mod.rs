pub mod memory;
pub mod requisition;

pub use memory::InMemoryWorkflowRepository;
pub use requisition::SqlWorkflowRepository;
