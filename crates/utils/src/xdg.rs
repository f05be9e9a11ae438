use std::env;
use std::path::PathBuf;

/// XDG Base Directory paths for cachefn
pub struct XdgPaths;

impl XdgPaths {
    /// Get XDG_CONFIG_HOME/cachefn or fallback
    pub fn config_dir() -> PathBuf {
        env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(dirs::config_dir)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|home| home.join(".config"))
                    .unwrap_or_else(|| PathBuf::from(".config"))
            })
            .join("cachefn")
    }

    /// Get the default configuration file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir_honours_xdg_config_home() {
        let original = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", "/tmp/xdg-test");

        assert_eq!(XdgPaths::config_dir(), PathBuf::from("/tmp/xdg-test/cachefn"));
        assert_eq!(
            XdgPaths::config_file(),
            PathBuf::from("/tmp/xdg-test/cachefn/config.json")
        );

        match original {
            Some(value) => env::set_var("XDG_CONFIG_HOME", value),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}
