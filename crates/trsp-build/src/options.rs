use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub base_dir: PathBuf,
    pub descriptor_file_name: String,
    pub clean: bool,
    pub python_wrapper: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            descriptor_file_name: "config.pbtxt".to_string(),
            clean: false,
            python_wrapper: true,
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory that relative repository, artifact and module paths resolve against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_descriptor_file_name(mut self, name: impl Into<String>) -> Self {
        self.descriptor_file_name = name.into();
        self
    }

    /// Remove the repository root before building.
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn with_python_wrapper(mut self, enable: bool) -> Self {
        self.python_wrapper = enable;
        self
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if let Ok(rest) = path.strip_prefix("~") {
            if let Some(home) = dirs::home_dir() {
                return if rest.as_os_str().is_empty() {
                    home
                } else {
                    home.join(rest)
                };
            }
        }
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}
