use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::error::{self, Context};

pub type Kdf = hkdf::Hkdf<sha3::Sha3_512>;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// path of a yaml settings file to load
    #[arg(long)]
    config: Option<PathBuf>,
}

pub struct Config {
    pub settings: Settings,
    pub kdf: Kdf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listener: SocketAddr,
    pub assets: PathBuf,
    pub templates: Templates,
    pub data: Data,
    pub storage: Storage,
    pub sec: Sec,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Templates {
    pub directory: PathBuf,
    pub dev_mode: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Data {
    /// csv dataset imported on startup when the patient store is empty
    pub patients_csv: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    Memory,
    Postgres {
        user: String,
        password: Option<String>,
        host: String,
        port: Option<u16>,
        dbname: String,
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sec {
    /// every signing key is derived from this value
    pub master_key: String,
    pub session: Session,
    pub totp: Totp,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Session {
    /// seconds before an idle session is dropped
    pub lifetime: u64,
    pub secure: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Totp {
    /// issuer label placed in provisioning uris
    pub issuer: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            listener: SocketAddr::from(([0, 0, 0, 0], 8070)),
            assets: PathBuf::from("./assets"),
            templates: Default::default(),
            data: Default::default(),
            storage: Default::default(),
            sec: Default::default(),
        }
    }
}

impl Default for Templates {
    fn default() -> Self {
        Templates {
            directory: PathBuf::from("./templates"),
            dev_mode: false,
        }
    }
}

impl Default for Data {
    fn default() -> Self {
        Data {
            patients_csv: Some(PathBuf::from("./data/patients.csv")),
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage::Memory
    }
}

impl Default for Sec {
    fn default() -> Self {
        Sec {
            master_key: String::from("dev-change-me"),
            session: Default::default(),
            totp: Default::default(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Session {
            lifetime: 60 * 30,
            secure: false,
        }
    }
}

impl Default for Totp {
    fn default() -> Self {
        Totp {
            issuer: String::from("StrokePortal"),
        }
    }
}

impl Config {
    #[cfg(test)]
    pub fn default_for_tests() -> Self {
        let settings = Settings::default();
        let kdf = Kdf::new(None, settings.sec.master_key.as_bytes());

        Config {
            settings,
            kdf,
        }
    }

    pub fn from_args(args: CliArgs) -> error::Result<Self> {
        let settings = if let Some(path) = args.config {
            tracing::debug!("loading settings file \"{}\"", path.display());

            let file = std::fs::OpenOptions::new()
                .read(true)
                .open(&path)
                .context(format!("failed to open settings file: \"{}\"", path.display()))?;

            serde_yaml::from_reader(file)
                .context(format!("failed to parse settings file: \"{}\"", path.display()))?
        } else {
            Settings::default()
        };

        {
            let meta = std::fs::metadata(&settings.templates.directory).context(
                "failed to retrieve metadata for settings.templates.directory"
            )?;

            if !meta.is_dir() {
                return Err(error::Error::new().context(
                    "settings.templates.directory is not a directory"
                ));
            }
        }

        {
            let meta = std::fs::metadata(&settings.assets).context(
                "failed to retrieve metadata for settings.assets"
            )?;

            if !meta.is_dir() {
                return Err(error::Error::new().context(
                    "settings.assets is not a directory"
                ));
            }
        }

        tracing::debug!("{settings:#?}");

        let kdf = Kdf::new(None, settings.sec.master_key.as_bytes());

        Ok(Config {
            settings,
            kdf,
        })
    }
}

pub fn get_config() -> error::Result<Config> {
    Config::from_args(CliArgs::parse())
}
