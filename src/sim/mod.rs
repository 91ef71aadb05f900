pub mod backend;
pub mod config;
pub mod cpu;
pub mod double_buffer;
pub mod field;
pub mod input;
pub mod passes;
pub mod profile;
pub mod scheduler;
pub mod stepper;

pub use backend::{DisplayParams, GridSize, PassBackend, SplatTarget};
pub use config::FluidConfig;
pub use cpu::CpuBackend;
pub use input::{InputController, InputHandle, InteractionController, PointerState};
pub use profile::{DeviceHint, DeviceProfile, DeviceTier};
pub use scheduler::{FrameScheduler, FrameStats, SchedulerState, TickOutcome};
pub use stepper::{Splat, Stepper};
