#[cfg(test)]
mod tests {
    use crate::config::{AppConfig, ScannerConfig};

    #[test]
    fn embedded_defaults_deserialize() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.storage.catalog_file, "projects.json");
        assert_eq!(cfg.storage.settings_file, "settings.json");
        assert_eq!(cfg.storage.flush_debounce_ms, 500);
        assert!(cfg.scan_defaults.ignore_patterns.iter().any(|p| p.contains("node_modules")));
        assert_eq!(cfg.git.timeout_ms, 5000);
        assert!(cfg.search.similarity_threshold > 0.0);
    }

    #[test]
    fn scanner_defaults_match_the_embedded_file() {
        let cfg = AppConfig::default();
        let fallback = ScannerConfig::default();
        assert_eq!(cfg.scanner.progress_batch, fallback.progress_batch);
        assert_eq!(cfg.scanner.size_sample_cap_bytes, fallback.size_sample_cap_bytes);
        assert_eq!(cfg.scanner.sample_depth, fallback.sample_depth);
        assert_eq!(cfg.scanner.readme_depth, fallback.readme_depth);
    }

    #[test]
    fn storage_paths_are_rooted_in_the_data_dir() {
        let mut cfg = AppConfig::default();
        cfg.storage.data_dir = "/var/lib/projektwald".to_string();
        assert_eq!(
            cfg.storage.catalog_path(),
            std::path::PathBuf::from("/var/lib/projektwald/projects.json")
        );
        assert_eq!(
            cfg.storage.settings_path(),
            std::path::PathBuf::from("/var/lib/projektwald/settings.json")
        );
    }

    #[test]
    fn load_accepts_the_embedded_configuration() {
        let cfg = crate::config::load().expect("embedded defaults must validate");
        assert!(cfg.scanner.progress_batch > 0);
        assert!(cfg.storage.flush_debounce_ms > 0);
    }
}
