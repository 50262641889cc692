use std::{env, path::PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub data_file: PathBuf,
    pub uploads_dir: PathBuf,
    pub web_port: u16,
    pub auth_secret: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let web_port = env::var("WEB_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| crate::Error::Config("WEB_PORT must be a valid port number".into()))?;

        let auth_secret = env::var("AUTH_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| crate::Error::Config("AUTH_SECRET must be set".into()))?;

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(crate::Error::Config(format!(
                    "LOG_FORMAT must be `pretty` or `json`, got `{}`",
                    other
                )))
            }
        };

        Ok(Self {
            data_file: env::var("DATA_FILE")
                .unwrap_or_else(|_| "./data/posts.json".to_string())
                .into(),
            uploads_dir: env::var("UPLOADS_DIR")
                .unwrap_or_else(|_| "./public/uploads".to_string())
                .into(),
            web_port,
            auth_secret,
            log_format,
        })
    }

    pub fn web_addr(&self) -> String {
        format!("0.0.0.0:{}", self.web_port)
    }
}
