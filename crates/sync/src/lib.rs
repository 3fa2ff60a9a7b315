//! Concurrency and resource primitives for the grouping engine.
//!
//! - [`BoundedGate`] — FIFO-fair admission control for concurrent work.
//! - [`SharedCell`] — mutex-guarded mutable state shared across tasks.
//! - [`LoadMonitor`] — advisory memory-pressure sampling and width adaptation.

pub mod cell;
pub mod gate;
pub mod monitor;

pub use cell::SharedCell;
pub use gate::{BoundedGate, GatePermit};
pub use monitor::{
    LoadMonitor, MemoryProbe, MemorySample, MonitorConfig, PressureLevel, ProcfsProbe,
};
