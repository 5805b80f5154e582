//! Carga y gestión de configuración de la aplicación (Elasticsearch + servidor).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::flatten::DEFAULT_PATH_SEPARATOR;

/// Índice usado cuando el entorno no define ninguno.
pub const FALLBACK_INDEX: &str = "bookmark_sample";

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub elasticsearch_base_url: String,
    pub elastic_user: String,
    pub elastic_password: String,
    pub default_index: String,
    pub es_timeout: Duration,

    pub server_addr: String,
    pub open_browser: bool,

    pub path_separator: String,
    pub bookmarks_file: Option<PathBuf>,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construye la configuración a partir de cualquier fuente clave/valor.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("ELASTICSEARCH_BASE_URL")
            .ok_or_else(|| anyhow!("Falta ELASTICSEARCH_BASE_URL en el entorno"))?;
        Url::parse(&base_url)
            .with_context(|| format!("ELASTICSEARCH_BASE_URL no es una URL válida: {base_url}"))?;
        let elasticsearch_base_url = base_url.trim_end_matches('/').to_string();

        let elastic_user =
            lookup("ELASTIC_USER").ok_or_else(|| anyhow!("Falta ELASTIC_USER en el entorno"))?;
        let elastic_password = lookup("ELASTIC_USER_PASSWORD")
            .ok_or_else(|| anyhow!("Falta ELASTIC_USER_PASSWORD en el entorno"))?;

        // La clave en minúsculas tiene prioridad sobre la de mayúsculas.
        let default_index = lookup("default_index")
            .or_else(|| lookup("DEFAULT_INDEX"))
            .unwrap_or_else(|| FALLBACK_INDEX.to_string());

        let es_timeout_secs = match lookup("ES_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("ES_TIMEOUT_SECS debe ser un entero: {raw}"))?,
            None => 30,
        };

        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3322".to_string());

        let open_browser = match lookup("OPEN_BROWSER") {
            Some(raw) => parse_bool(&raw)?,
            None => true,
        };

        let path_separator = lookup("BOOKMARKS_PATH_SEPARATOR")
            .unwrap_or_else(|| DEFAULT_PATH_SEPARATOR.to_string());
        let bookmarks_file = lookup("BOOKMARKS_FILE")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            elasticsearch_base_url,
            elastic_user,
            elastic_password,
            default_index,
            es_timeout: Duration::from_secs(es_timeout_secs),
            server_addr,
            open_browser,
            path_separator,
            bookmarks_file,
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Valor booleano no soportado: {other}")),
    }
}
