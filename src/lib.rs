//! Aplanado de exportaciones de marcadores del navegador y consulta web
//! sobre el índice de Elasticsearch donde se cargan.
//!
//! El núcleo (`flatten`) no depende del resto y puede usarse por separado.

pub mod api;
pub mod app_state;
pub mod config;
pub mod flatten;
pub mod models;
pub mod search;

pub use flatten::BookmarkNodes;
pub use models::BookmarkRecord;
