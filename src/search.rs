//! Cliente de consulta contra Elasticsearch para el índice de marcadores.
//!
//! Traduce un tipo de búsqueda (`by_id`, `by_title`, ...) y un valor a la
//! petición correspondiente, y normaliza la respuesta del motor en
//! registros, "sin resultados" o el error que reporte el propio motor.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tracing::{debug, error};
use url::Url;

use crate::config::AppConfig;

/// Mensaje cuando el motor devuelve `error` sin `reason`.
pub const UNKNOWN_ENGINE_ERROR: &str = "Unknown application error";

/// Campo por el que se busca.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    ById,
    ByTitle,
    ByPath,
    ByUri,
    ByKeyword,
    ByTags,
}

impl SearchType {
    /// Campo del documento sobre el que actúa la búsqueda.
    pub fn field(self) -> &'static str {
        match self {
            Self::ById => "original_id",
            Self::ByTitle => "title",
            Self::ByPath => "path",
            Self::ByUri => "uri",
            Self::ByKeyword => "keyword",
            Self::ByTags => "tags",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ById => "by_id",
            Self::ByTitle => "by_title",
            Self::ByPath => "by_path",
            Self::ByUri => "by_uri",
            Self::ByKeyword => "by_keyword",
            Self::ByTags => "by_tags",
        }
    }
}

impl FromStr for SearchType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "by_id" => Ok(Self::ById),
            "by_title" => Ok(Self::ByTitle),
            "by_path" => Ok(Self::ByPath),
            "by_uri" => Ok(Self::ByUri),
            "by_keyword" => Ok(Self::ByKeyword),
            "by_tags" => Ok(Self::ByTags),
            _ => Err(anyhow!("Invalid search type")),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resultado normalizado de una consulta.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Records(Vec<Value>),
    NoRecords,
    EngineError(String),
}

/// Consulta `wildcard` sobre `<campo>.keyword`.
pub fn wildcard_search_json(field: &str, value: &str) -> Value {
    let field_name = format!("{field}.keyword");
    json!({
        "query": {
            "wildcard": {
                field_name: {
                    "value": value,
                    "boost": 1.0,
                    "rewrite": "constant_score"
                }
            }
        }
    })
}

/// Extrae `hits.hits` si existe y no está vacío.
pub fn standardize_records(raw: &Value) -> Option<Vec<Value>> {
    match raw.pointer("/hits/hits") {
        Some(Value::Array(hits)) if !hits.is_empty() => Some(hits.clone()),
        _ => None,
    }
}

/// Motivo del error reportado por el motor, si la respuesta trae `error`.
pub fn engine_error_reason(raw: &Value) -> Option<String> {
    let error = raw.get("error")?;
    let reason = error
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_ENGINE_ERROR);
    Some(reason.to_string())
}

/// Interpreta la respuesta de `_search`.
pub fn interpret_search_response(raw: &Value) -> SearchOutcome {
    if let Some(reason) = engine_error_reason(raw) {
        error!("Elasticsearch devolvió un error: {raw}");
        return SearchOutcome::EngineError(reason);
    }
    match standardize_records(raw) {
        Some(records) => SearchOutcome::Records(records),
        None => SearchOutcome::NoRecords,
    }
}

/// Interpreta la respuesta de `_doc/{id}`: el documento completo es el
/// único registro cuando `found` es verdadero.
pub fn interpret_document_response(raw: &Value) -> SearchOutcome {
    if raw.get("found").and_then(Value::as_bool) == Some(true) {
        return SearchOutcome::Records(vec![raw.clone()]);
    }
    if let Some(reason) = engine_error_reason(raw) {
        error!("Elasticsearch devolvió un error: {raw}");
        return SearchOutcome::EngineError(reason);
    }
    SearchOutcome::NoRecords
}

/// Cliente HTTP con autenticación básica contra un índice concreto.
#[derive(Debug, Clone)]
pub struct ElasticClient {
    http: reqwest::Client,
    base_url: Url,
    index: String,
    user: String,
    password: String,
}

impl ElasticClient {
    pub fn new(
        base_url: &str,
        index: &str,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("URL de Elasticsearch inválida: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("URL de Elasticsearch inválida: {base_url}"));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("No se pudo construir el cliente HTTP")?;

        Ok(Self {
            http,
            base_url,
            index: index.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(
            &cfg.elasticsearch_base_url,
            &cfg.default_index,
            &cfg.elastic_user,
            &cfg.elastic_password,
            cfg.es_timeout,
        )
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Lanza la búsqueda indicada y normaliza la respuesta.
    pub async fn search(&self, search_type: SearchType, value: &str) -> Result<SearchOutcome> {
        match search_type {
            SearchType::ById => self.get_document(value).await,
            other => self.wildcard_search(other.field(), value).await,
        }
    }

    async fn get_document(&self, id: &str) -> Result<SearchOutcome> {
        let url = self.endpoint(&["_doc", id])?;
        debug!("GET {url}");
        let response = self
            .http
            .get(url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .context("Falló la petición a Elasticsearch")?;
        let raw: Value = response
            .json()
            .await
            .context("Respuesta de Elasticsearch no es JSON")?;
        Ok(interpret_document_response(&raw))
    }

    async fn wildcard_search(&self, field: &str, value: &str) -> Result<SearchOutcome> {
        let url = self.endpoint(&["_search", ""])?;
        let body = wildcard_search_json(field, value);
        debug!("POST {url} {body}");
        let response = self
            .http
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .context("Falló la petición a Elasticsearch")?;
        let raw: Value = response
            .json()
            .await
            .context("Respuesta de Elasticsearch no es JSON")?;
        Ok(interpret_search_response(&raw))
    }

    /// Comprueba que el clúster responde con un estado de éxito.
    pub async fn ping(&self) -> Result<bool> {
        let response = self
            .http
            .get(self.base_url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .context("Falló la petición a Elasticsearch")?;
        Ok(response.status().is_success())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("URL de Elasticsearch inválida: {}", self.base_url))?
            .pop_if_empty()
            .push(&self.index)
            .extend(segments);
        Ok(url)
    }
}
