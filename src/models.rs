//! Modelos de dominio (registro plano de un marcador listo para indexar).

use serde::Serialize;
use serde_json::{Map, Value};

/// Registro normalizado de un marcador terminal.
/// Se construye una sola vez durante el aplanado y no se modifica después.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkRecord {
    pub(crate) path: Option<String>,
    pub(crate) title: String,
    pub(crate) original_id: Option<String>,
    pub(crate) uri: Option<String>,
    pub(crate) keyword: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) date_added_microseconds: Option<i64>,
    pub(crate) last_modified_microseconds: Option<i64>,
    pub(crate) date_added_iso: Option<String>,
    pub(crate) last_modified_iso: Option<String>,
}

impl BookmarkRecord {
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn original_id(&self) -> Option<&str> {
        self.original_id.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn date_added_microseconds(&self) -> Option<i64> {
        self.date_added_microseconds
    }

    pub fn last_modified_microseconds(&self) -> Option<i64> {
        self.last_modified_microseconds
    }

    pub fn date_added_iso(&self) -> Option<&str> {
        self.date_added_iso.as_deref()
    }

    pub fn last_modified_iso(&self) -> Option<&str> {
        self.last_modified_iso.as_deref()
    }

    /// Copia superficial de los campos como mapa JSON, con las mismas
    /// claves que usa el documento indexado.
    pub fn copy_as_map(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("path".into(), Value::from(self.path.clone()));
        fields.insert("title".into(), Value::from(self.title.clone()));
        fields.insert("original_id".into(), Value::from(self.original_id.clone()));
        fields.insert("uri".into(), Value::from(self.uri.clone()));
        fields.insert("keyword".into(), Value::from(self.keyword.clone()));
        fields.insert("tags".into(), Value::from(self.tags.clone()));
        fields.insert(
            "date_added_microseconds".into(),
            Value::from(self.date_added_microseconds),
        );
        fields.insert(
            "last_modified_microseconds".into(),
            Value::from(self.last_modified_microseconds),
        );
        fields.insert("date_added_iso".into(), Value::from(self.date_added_iso.clone()));
        fields.insert(
            "last_modified_iso".into(),
            Value::from(self.last_modified_iso.clone()),
        );
        fields
    }
}
