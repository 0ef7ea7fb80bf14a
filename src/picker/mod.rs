pub mod client;
pub mod flow;

pub use client::PickerClient;
pub use flow::{FlowPhase, PickFlow, PickFlows};
