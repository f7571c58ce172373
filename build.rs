use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    config: ConfigSection,
}

#[derive(Deserialize, Default)]
struct ConfigSection {
    page_size: Option<usize>,
    epoch_count: Option<usize>,
    cache_array_capacity: Option<usize>,
    enable_rss_reclamation: Option<bool>,
    enable_diagnostic_counters: Option<bool>,
    enable_adaptive_scan: Option<bool>,
}

struct ResolvedConfig {
    page_size: usize,
    page_shift: u32,
    epoch_count: usize,
    epoch_shift: u32,
    cache_array_capacity: usize,
    enable_rss_reclamation: bool,
    enable_diagnostic_counters: bool,
    enable_adaptive_scan: bool,
}

fn resolve_config(cfg: &ConfigSection) -> ResolvedConfig {
    let page_size = cfg.page_size.unwrap_or(4096);
    assert!(
        page_size > 0 && page_size.is_power_of_two(),
        "page_size ({page_size}) must be a power of 2"
    );
    assert!(page_size >= 4096, "page_size ({page_size}) must be >= 4096");

    let epoch_count = cfg.epoch_count.unwrap_or(16);
    assert!(
        epoch_count >= 2 && epoch_count.is_power_of_two(),
        "epoch_count ({epoch_count}) must be a power of 2 >= 2"
    );

    let cache_array_capacity = cfg.cache_array_capacity.unwrap_or(32);
    assert!(
        cache_array_capacity > 0,
        "cache_array_capacity must be > 0"
    );

    ResolvedConfig {
        page_size,
        page_shift: page_size.trailing_zeros(),
        epoch_count,
        epoch_shift: epoch_count.trailing_zeros(),
        cache_array_capacity,
        enable_rss_reclamation: cfg.enable_rss_reclamation.unwrap_or(true),
        enable_diagnostic_counters: cfg.enable_diagnostic_counters.unwrap_or(true),
        enable_adaptive_scan: cfg.enable_adaptive_scan.unwrap_or(false),
    }
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{manifest_dir}/slabrt.toml")
}

fn generate_config(cfg: &ResolvedConfig, out_path: &Path) {
    let code = format!(
        "// Auto-generated by build.rs. Do not edit.\n\n\
         pub const PAGE_SHIFT: usize = {};\n\
         pub const PAGE_SIZE: usize = {};\n\
         pub const EPOCH_COUNT: usize = {};\n\
         pub const EPOCH_SHIFT: u32 = {};\n\
         pub const CACHE_ARRAY_CAPACITY: usize = {};\n\
         pub const ENABLE_RSS_RECLAMATION: bool = {};\n\
         pub const ENABLE_DIAGNOSTIC_COUNTERS: bool = {};\n\
         pub const ENABLE_ADAPTIVE_SCAN: bool = {};\n",
        cfg.page_shift,
        cfg.page_size,
        cfg.epoch_count,
        cfg.epoch_shift,
        cfg.cache_array_capacity,
        cfg.enable_rss_reclamation,
        cfg.enable_diagnostic_counters,
        cfg.enable_adaptive_scan,
    );
    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn main() {
    println!("cargo:rerun-if-env-changed=SLABRT_CONFIG");

    let out_dir = env::var("OUT_DIR").unwrap();
    let config_path = env::var("SLABRT_CONFIG").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={config_path}");

    let resolved = match fs::read_to_string(&config_path) {
        Ok(content) => {
            let file: ConfigFile =
                toml::from_str(&content).expect("failed to parse SLABRT_CONFIG TOML");
            resolve_config(&file.config)
        }
        Err(_) => resolve_config(&ConfigSection::default()),
    };

    generate_config(&resolved, &Path::new(&out_dir).join("config_gen.rs"));
}
