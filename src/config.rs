use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub catalog_file: String,
    pub settings_file: String,
    pub flush_debounce_ms: u64,
}

impl StorageConfig {
    pub fn catalog_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.catalog_file)
    }

    pub fn settings_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.settings_file)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanDefaultsConfig {
    pub ignore_patterns: Vec<String>,
    pub max_depth: Option<u32>,
    pub min_size_bytes: u64,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// A progress event is emitted once per this many processed candidates.
    pub progress_batch: usize,
    /// Size sampling stops once this many bytes have been accumulated.
    pub size_sample_cap_bytes: u64,
    pub sample_depth: usize,
    pub file_count_depth: usize,
    pub readme_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitConfig {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub similarity_threshold: f32,
    pub min_query_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub scan_defaults: ScanDefaultsConfig,
    pub scanner: ScannerConfig,
    pub git: GitConfig,
    pub search: SearchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        // Mirror defaults from config/default.toml
        Self {
            progress_batch: 10,
            size_sample_cap_bytes: 100 * 1024 * 1024,
            sample_depth: 8,
            file_count_depth: 6,
            readme_depth: 2,
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: projektwald.toml (in CWD)
        .add_source(::config::File::with_name("projektwald").required(false));

    if let Ok(custom_path) = std::env::var("PROJEKTWALD_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("PROJEKTWALD").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Storage
    if cfg.storage.catalog_file.trim().is_empty() {
        return Err(anyhow::anyhow!("storage.catalog_file must not be empty"));
    }
    if cfg.storage.settings_file.trim().is_empty() {
        return Err(anyhow::anyhow!("storage.settings_file must not be empty"));
    }
    if cfg.storage.flush_debounce_ms == 0 {
        return Err(anyhow::anyhow!("storage.flush_debounce_ms must be > 0"));
    }

    // Scanner
    if cfg.scanner.progress_batch == 0 {
        return Err(anyhow::anyhow!("scanner.progress_batch must be > 0"));
    }
    if cfg.scanner.size_sample_cap_bytes == 0 {
        return Err(anyhow::anyhow!("scanner.size_sample_cap_bytes must be > 0"));
    }
    if cfg.scanner.sample_depth == 0 || cfg.scanner.file_count_depth == 0 {
        return Err(anyhow::anyhow!("scanner depth limits must be > 0"));
    }

    // Scan defaults
    if let Some(c) = cfg.scan_defaults.concurrency {
        if c == 0 || c > 256 {
            return Err(anyhow::anyhow!("scan_defaults.concurrency must be in 1..=256"));
        }
    }

    // Git
    if cfg.git.timeout_ms == 0 {
        return Err(anyhow::anyhow!("git.timeout_ms must be > 0"));
    }

    // Search
    if !(0.0..=1.0).contains(&cfg.search.similarity_threshold) {
        return Err(anyhow::anyhow!("search.similarity_threshold must be in 0.0..=1.0"));
    }
    if cfg.search.min_query_len == 0 {
        return Err(anyhow::anyhow!("search.min_query_len must be > 0"));
    }

    Ok(())
}
