//! Aplanado de una exportación de marcadores (árbol JSON de carpetas y
//! entradas) en una secuencia ordenada de `BookmarkRecord`.
//!
//! API pública:
//!   - `BookmarkNodes::new(&Value, separador)`
//!   - `BookmarkNodes::from_json_str(&str, separador)` / `from_reader`
//!   - `iter()`, `records()`, `node_count()`.
//!
//! El recorrido es en profundidad y respeta el orden de `children`. Se usa
//! una pila explícita de (nodo, ruta acumulada) en vez de recursión para que
//! los árboles muy profundos no agoten la pila.

use std::io::Read;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::BookmarkRecord;

/// Separador de ruta por defecto (tabulador).
pub const DEFAULT_PATH_SEPARATOR: &str = "\t";

/// Título usado cuando un nodo no tiene título o está vacío.
const UNTITLED: &str = ".";

/// Resultado del aplanado: todos los registros terminales, en orden.
#[derive(Debug, Clone)]
pub struct BookmarkNodes {
    path_sep: String,
    records: Vec<BookmarkRecord>,
}

impl BookmarkNodes {
    /// Recorre el árbol completo de inmediato y guarda los registros.
    pub fn new(root: &Value, path_sep: &str) -> Result<Self> {
        let records = flatten_tree(root, path_sep)?;
        debug!("Aplanado completado: {} registros.", records.len());
        Ok(Self {
            path_sep: path_sep.to_string(),
            records,
        })
    }

    pub fn with_default_separator(root: &Value) -> Result<Self> {
        Self::new(root, DEFAULT_PATH_SEPARATOR)
    }

    /// Parsea el documento JSON de la exportación y lo aplana.
    pub fn from_json_str(json: &str, path_sep: &str) -> Result<Self> {
        let root: Value =
            serde_json::from_str(json).context("La exportación de marcadores no es JSON válido")?;
        Self::new(&root, path_sep)
    }

    pub fn from_reader<R: Read>(reader: R, path_sep: &str) -> Result<Self> {
        let root: Value = serde_json::from_reader(reader)
            .context("La exportación de marcadores no es JSON válido")?;
        Self::new(&root, path_sep)
    }

    /// Itera los registros en orden de recorrido; se puede llamar tantas
    /// veces como se quiera.
    pub fn iter(&self) -> std::slice::Iter<'_, BookmarkRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[BookmarkRecord] {
        &self.records
    }

    pub fn node_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path_separator(&self) -> &str {
        &self.path_sep
    }

    pub fn into_records(self) -> Vec<BookmarkRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a BookmarkNodes {
    type Item = &'a BookmarkRecord;
    type IntoIter = std::slice::Iter<'a, BookmarkRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn flatten_tree(root: &Value, path_sep: &str) -> Result<Vec<BookmarkRecord>> {
    let mut records = Vec::new();
    // La raíz nunca aporta su propio título a la ruta de sus hijos.
    let mut pending: Vec<(&Value, Option<String>)> = vec![(root, None)];

    while let Some((node, path)) = pending.pop() {
        let fields = node_fields(node, path.as_deref())?;

        if !is_container(fields, path.as_deref())? {
            records.push(terminal_node_to_record(fields, path)?);
            continue;
        }

        let children = match fields.get("children") {
            None | Some(Value::Null) => continue,
            Some(Value::Array(children)) => children,
            Some(_) => {
                return Err(anyhow!(
                    "El campo 'children' debe ser una lista (nodo en {})",
                    describe_path(path.as_deref())
                ))
            }
        };

        // Se apilan en orden inverso para que el primer hijo salga primero.
        // Sólo las carpetas añaden su título a la ruta; un marcador hereda
        // la ruta de la carpeta que lo contiene.
        for child in children.iter().rev() {
            let child_fields = node_fields(child, path.as_deref())?;
            if !is_container(child_fields, path.as_deref())? {
                // El título del marcador no entra en su ruta, a diferencia del cargador en Python.
                pending.push((child, path.clone()));
                continue;
            }
            let child_title = node_title(child_fields, path.as_deref())?;
            let child_path = match path.as_deref() {
                Some(parent) if !parent.is_empty() => format!("{parent}{path_sep}{child_title}"),
                _ => child_title,
            };
            pending.push((child, Some(child_path)));
        }
    }

    Ok(records)
}

fn terminal_node_to_record(
    fields: &Map<String, Value>,
    path: Option<String>,
) -> Result<BookmarkRecord> {
    let at = path.as_deref();
    let date_added_microseconds = timestamp_field(fields, "dateAdded", at)?;
    let last_modified_microseconds = timestamp_field(fields, "lastModified", at)?;

    Ok(BookmarkRecord {
        title: node_title(fields, at)?,
        original_id: node_id(fields, at)?,
        uri: optional_string(fields, "uri", at)?,
        keyword: optional_string(fields, "keyword", at)?,
        tags: node_tags(fields, at)?,
        date_added_microseconds,
        last_modified_microseconds,
        date_added_iso: date_added_microseconds.map(to_local_iso).transpose()?,
        last_modified_iso: last_modified_microseconds.map(to_local_iso).transpose()?,
        path,
    })
}

fn node_fields<'a>(node: &'a Value, at: Option<&str>) -> Result<&'a Map<String, Value>> {
    node.as_object().ok_or_else(|| {
        anyhow!(
            "Cada nodo del árbol debe ser un objeto JSON (nodo en {})",
            describe_path(at)
        )
    })
}

fn is_container(fields: &Map<String, Value>, at: Option<&str>) -> Result<bool> {
    match fields.get("type") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::String(kind)) => Ok(kind.contains("container")),
        Some(_) => Err(type_error("type", "una cadena", at)),
    }
}

fn node_title(fields: &Map<String, Value>, at: Option<&str>) -> Result<String> {
    match fields.get("title") {
        None | Some(Value::Null) => Ok(UNTITLED.to_string()),
        Some(Value::String(title)) if title.is_empty() => Ok(UNTITLED.to_string()),
        Some(Value::String(title)) => Ok(title.clone()),
        Some(_) => Err(type_error("title", "una cadena", at)),
    }
}

fn node_id(fields: &Map<String, Value>, at: Option<&str>) -> Result<Option<String>> {
    match fields.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if id.is_empty() => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(Value::Number(id)) => Ok(Some(id.to_string())),
        Some(_) => Err(type_error("id", "una cadena o un número", at)),
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    key: &str,
    at: Option<&str>,
) -> Result<Option<String>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if value.is_empty() => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(type_error(key, "una cadena", at)),
    }
}

fn node_tags(fields: &Map<String, Value>, at: Option<&str>) -> Result<Vec<String>> {
    match fields.get("tags") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(tags)) => Ok(tags.split(',').map(|t| t.trim().to_string()).collect()),
        Some(_) => Err(type_error("tags", "una cadena separada por comas", at)),
    }
}

fn timestamp_field(fields: &Map<String, Value>, key: &str, at: Option<&str>) -> Result<Option<i64>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if value.is_empty() => Ok(None),
        Some(Value::Number(value)) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| type_error(key, "un entero de microsegundos", at)),
        Some(_) => Err(type_error(key, "un entero de microsegundos", at)),
    }
}

fn type_error(key: &str, expected: &str, at: Option<&str>) -> anyhow::Error {
    anyhow!(
        "El campo '{key}' debe ser {expected} (nodo en {})",
        describe_path(at)
    )
}

fn describe_path(at: Option<&str>) -> String {
    match at {
        Some(path) => format!("'{}'", path.replace('\t', " / ")),
        None => "la raíz".to_string(),
    }
}

/// Convierte microsegundos desde epoch a ISO-8601 en la zona horaria local.
pub fn to_local_iso(microseconds: i64) -> Result<String> {
    format_iso_in(microseconds, &Local)
        .ok_or_else(|| anyhow!("Marca de tiempo fuera de rango: {microseconds}"))
}

/// `YYYY-MM-DDTHH:MM:SS`, con `.ffffff` sólo si hay fracción de segundo.
/// Sin sufijo de zona horaria.
fn format_iso_in<Tz: TimeZone>(microseconds: i64, tz: &Tz) -> Option<String> {
    let local = DateTime::<Utc>::from_timestamp_micros(microseconds)?
        .with_timezone(tz)
        .naive_local();
    let mut iso = local.format("%Y-%m-%dT%H:%M:%S").to_string();
    let micros = local.nanosecond() / 1_000;
    if micros != 0 {
        iso.push_str(&format!(".{micros:06}"));
    }
    Some(iso)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use serde_json::json;

    fn flatten(tree: Value) -> Vec<BookmarkRecord> {
        BookmarkNodes::with_default_separator(&tree)
            .unwrap()
            .into_records()
    }

    fn container(title: &str, children: Value) -> Value {
        json!({ "type": "text/x-moz-place-container", "title": title, "children": children })
    }

    #[test]
    fn work_site_scenario_yields_one_record() {
        let tree = json!({
            "type": "container",
            "children": [{
                "title": "Work",
                "type": "container",
                "children": [{ "title": "Site", "uri": "http://x", "dateAdded": 1_000_000 }]
            }]
        });
        let records = flatten(tree);
        assert_eq!(records.len(), 1);
        let site = &records[0];
        assert_eq!(site.path(), Some("Work"));
        assert_eq!(site.title(), "Site");
        assert_eq!(site.uri(), Some("http://x"));
        assert_eq!(site.date_added_microseconds(), Some(1_000_000));
        assert_eq!(site.date_added_iso(), Some(to_local_iso(1_000_000).unwrap().as_str()));
        assert_eq!(site.last_modified_iso(), None);
    }

    #[test]
    fn nested_paths_join_with_the_separator() {
        let tree = container(
            "root",
            json!([container("A", json!([container("B", json!([{ "title": "leaf" }]))]))]),
        );
        let nodes = BookmarkNodes::new(&tree, " > ").unwrap();
        assert_eq!(nodes.path_separator(), " > ");
        assert_eq!(nodes.records()[0].path(), Some("A > B"));
    }

    #[test]
    fn top_level_bookmarks_have_no_path() {
        let tree = container("raíz", json!([{ "title": "solo" }]));
        let records = flatten(tree);
        assert_eq!(records[0].path(), None);
        assert_eq!(records[0].title(), "solo");
    }

    #[test]
    fn terminal_root_keeps_the_initial_path() {
        let records = flatten(json!({ "title": "suelto", "uri": "http://a" }));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path(), None);
        assert_eq!(records[0].title(), "suelto");
    }

    #[test]
    fn untitled_children_use_a_dot_segment() {
        let tree = container(
            "",
            json!([
                container("", json!([{ "uri": "http://a" }])),
                { "type": "text/x-moz-place-container", "children": [{ "title": "", "uri": "http://b" }] }
            ]),
        );
        let records = flatten(tree);
        assert_eq!(records[0].path(), Some("."));
        assert_eq!(records[0].title(), ".");
        assert_eq!(records[1].path(), Some("."));
        assert_eq!(records[1].title(), ".");
    }

    #[test]
    fn container_without_children_is_a_dead_branch() {
        let tree = container(
            "root",
            json!([
                { "type": "text/x-moz-place-container", "title": "vacía" },
                { "title": "vivo" }
            ]),
        );
        let records = flatten(tree);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title(), "vivo");

        let lonely = json!({ "type": "text/x-moz-place-container", "title": "sola" });
        assert!(BookmarkNodes::with_default_separator(&lonely).unwrap().is_empty());
    }

    #[test]
    fn non_container_types_are_terminal() {
        let tree = container(
            "root",
            json!([
                { "type": "text/x-moz-place", "title": "enlace" },
                { "type": "text/x-moz-place-separator" }
            ]),
        );
        let records = flatten(tree);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title(), ".");
    }

    #[test]
    fn records_follow_depth_first_children_order() {
        let tree = container(
            "root",
            json!([
                { "title": "1" },
                container("A", json!([{ "title": "2" }, container("B", json!([{ "title": "3" }]))])),
                { "title": "4" }
            ]),
        );
        let titles: Vec<_> = flatten(tree).iter().map(|r| r.title().to_string()).collect();
        assert_eq!(titles, ["1", "2", "3", "4"]);
    }

    #[test]
    fn numeric_and_string_ids_normalize_alike() {
        let tree = container(
            "root",
            json!([{ "id": 12345 }, { "id": "12345" }, { "id": "" }, {}]),
        );
        let ids: Vec<_> = flatten(tree).iter().map(|r| r.original_id().map(str::to_string)).collect();
        assert_eq!(
            ids,
            [Some("12345".to_string()), Some("12345".to_string()), None, None]
        );
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        let tree = container("root", json!([{ "tags": "a, b ,c" }, { "title": "sin tags" }]));
        let records = flatten(tree);
        assert_eq!(records[0].tags(), ["a", "b", "c"]);
        assert!(records[1].tags().is_empty());
    }

    #[test]
    fn empty_strings_and_missing_fields_are_indistinguishable() {
        let tree = container(
            "root",
            json!([
                { "title": "x", "uri": "", "keyword": "", "id": "", "dateAdded": "", "lastModified": "" },
                { "title": "x" }
            ]),
        );
        let records = flatten(tree);
        assert_eq!(records[0], records[1]);
        assert_eq!(records[0].uri(), None);
        assert_eq!(records[0].date_added_iso(), None);
    }

    #[test]
    fn flattening_is_idempotent() {
        let tree = container(
            "root",
            json!([
                container("A", json!([{ "title": "x", "dateAdded": 1_600_000_000_123_456i64, "tags": "t" }])),
                { "title": "y", "lastModified": 1_600_000_000_000_000i64 }
            ]),
        );
        let first = serde_json::to_string(&flatten(tree.clone())).unwrap();
        let second = serde_json::to_string(&flatten(tree)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn iteration_is_restartable() {
        let tree = container("root", json!([{ "title": "a" }, { "title": "b" }]));
        let nodes = BookmarkNodes::with_default_separator(&tree).unwrap();
        assert_eq!(nodes.node_count(), 2);
        assert_eq!(nodes.iter().count(), 2);
        let titles: Vec<_> = (&nodes).into_iter().map(BookmarkRecord::title).collect();
        assert_eq!(titles, ["a", "b"]);
    }

    #[test]
    fn iso_format_matches_naive_local_time() {
        assert_eq!(format_iso_in(1_000_000, &Utc).as_deref(), Some("1970-01-01T00:00:01"));
        assert_eq!(
            format_iso_in(1_500_000, &Utc).as_deref(),
            Some("1970-01-01T00:00:01.500000")
        );
        let madrid_winter = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(
            format_iso_in(1_700_000_000_000_000, &madrid_winter).as_deref(),
            Some("2023-11-14T23:13:20")
        );
        assert!(format_iso_in(i64::MAX, &Utc).is_none());
    }

    #[test]
    fn malformed_fields_fail_with_context() {
        let bad_tags = container("Menú", json!([container("Rust", json!([{ "tags": 3 }]))]));
        let err = BookmarkNodes::with_default_separator(&bad_tags).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'tags'"), "{message}");
        assert!(message.contains("Rust"), "{message}");

        let bad_date = json!({ "title": "x", "dateAdded": "ayer" });
        assert!(BookmarkNodes::with_default_separator(&bad_date).is_err());

        let bad_children = json!({ "type": "text/x-moz-place-container", "children": {} });
        assert!(BookmarkNodes::with_default_separator(&bad_children).is_err());

        assert!(BookmarkNodes::with_default_separator(&json!([1, 2])).is_err());
        assert!(BookmarkNodes::from_json_str("{ no es json", "\t").is_err());
    }

    #[test]
    fn deep_trees_do_not_need_deep_recursion() {
        let mut tree = json!({ "title": "fondo" });
        for _ in 0..2_000 {
            tree = container("d", json!([tree]));
        }
        let records = flatten(tree);
        assert_eq!(records.len(), 1);
        // La carpeta raíz no aporta segmento.
        let segments = records[0].path().unwrap().split('\t').count();
        assert_eq!(segments, 1_999);
    }

    #[test]
    fn firefox_export_fixture() {
        let json = include_str!("../tests/fixtures/bookmarks.json");
        let nodes = BookmarkNodes::from_json_str(json, "\t").unwrap();
        let paths: Vec<_> = nodes.iter().map(|r| r.path().unwrap_or("")).collect();
        assert_eq!(
            paths,
            [
                "menu\tMozilla Firefox",
                "menu\tMozilla Firefox",
                "menu",
                "toolbar",
                "unfiled",
            ]
        );

        let book = &nodes.records()[3];
        assert_eq!(book.original_id(), Some("42"));
        assert_eq!(book.keyword(), Some("rb"));
        assert_eq!(book.tags(), ["rust", "docs", "libros"]);
        assert_eq!(book.date_added_microseconds(), Some(1_577_836_800_000_000));
        assert!(book.date_added_iso().is_some());

        let separator = &nodes.records()[2];
        assert_eq!(separator.uri(), None);
        assert_eq!(separator.original_id(), Some("9"));

        let crates = &nodes.records()[4];
        assert_eq!(crates.last_modified_microseconds(), None);
        assert!(crates.tags().is_empty());
    }
}
