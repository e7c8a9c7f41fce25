pub use problem::{allocate, AllocationState, DemandRecord, FlowRecord, SourcePriorities};

pub mod problem;
