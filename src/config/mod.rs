pub mod settings;

pub use settings::{
    Config,
    MasterConfig,
    ParityConfig,
    RegisterPreset,
    SerialConfig,
    SlaveConfig,
    StopBitsConfig,
};
