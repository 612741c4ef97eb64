pub mod app;
pub mod audio_graph;
pub mod capture;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod devices;
pub mod ipc;
pub mod observer;
pub mod playback;
pub mod quantize;
pub mod scheduler;
pub mod task;

pub use app::*;
pub use audio_graph::*;
pub use capture::*;
pub use clock::*;
pub use config::*;
pub use debounce::*;
pub use devices::*;
pub use ipc::*;
pub use observer::*;
pub use playback::*;
pub use quantize::*;
pub use scheduler::*;
pub use task::*;
