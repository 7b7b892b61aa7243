use std::path::PathBuf;

const APP_DIR: &str = "livecast";

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "LIVECAST_CONFIG";

pub fn data_dir() -> PathBuf {
    // ~/.local/share/livecast on unix, matching XDG rather than
    // macOS Application Support
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Config file location, honouring `LIVECAST_CONFIG`.
pub fn config_file() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => config_dir().join("config.toml"),
    }
}
