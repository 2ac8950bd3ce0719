mod system;

pub use system::WasmPhaseSystem;
