use std::{fs::File, io::BufReader, path::PathBuf};

use home::home_dir;
use serde::Deserialize;

use gp5_reader::GpError;

#[derive(Default, Debug, Clone, Deserialize)]
pub struct Config {
    tabs_folder: Option<PathBuf>,
}

impl Config {
    // folder placed in $HOME directory
    const FOLDER: &'static str = ".gp5reader";

    fn get_base_path() -> Result<PathBuf, GpError> {
        let home = home_dir()
            .ok_or_else(|| GpError::ConfigError("Could not find home directory".to_string()))?;
        let path = home.join(Self::FOLDER);
        Ok(path)
    }

    fn get_path() -> Result<PathBuf, GpError> {
        let base = Self::get_base_path()?;
        Ok(base.join("config.json"))
    }

    /// Default config if the file does not exist
    pub fn read_config() -> Result<Self, GpError> {
        let config_path = Self::get_path()?;
        if !config_path.exists() {
            log::debug!("No local configuration at {config_path:?}");
            return Ok(Config::default());
        }
        let file = File::open(config_path)?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).map_err(|err| {
            GpError::ConfigError(format!("Could not read local configuration {err:}"))
        })?;
        Ok(config)
    }

    /// Relative paths missing from the working directory are looked up in the tabs folder.
    pub fn resolve_tab_path(&self, tab_file_path: PathBuf) -> PathBuf {
        if tab_file_path.is_absolute() || tab_file_path.exists() {
            return tab_file_path;
        }
        match &self.tabs_folder {
            Some(folder) => folder.join(tab_file_path),
            None => tab_file_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_against_tabs_folder() {
        let config: Config = serde_json::from_str(r#"{"tabs_folder": "/music/tabs"}"#).unwrap();
        assert_eq!(
            config.resolve_tab_path(PathBuf::from("missing/song.gp5")),
            PathBuf::from("/music/tabs/missing/song.gp5")
        );
        assert_eq!(
            config.resolve_tab_path(PathBuf::from("/abs/song.gp5")),
            PathBuf::from("/abs/song.gp5")
        );
    }

    #[test]
    fn resolve_without_tabs_folder() {
        let config = Config::default();
        assert_eq!(
            config.resolve_tab_path(PathBuf::from("song.gp5")),
            PathBuf::from("song.gp5")
        );
    }
}
