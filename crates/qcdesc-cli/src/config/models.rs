use qcdesc::core::io::xyz::EnergyUnit;
use qcdesc::engine::config::BatchConfig;
use std::path::PathBuf;

pub struct AppConfig {
    pub input_path: PathBuf,
    pub molecule: String,
    pub energy_unit: EnergyUnit,
    pub core_config: BatchConfig,
}
