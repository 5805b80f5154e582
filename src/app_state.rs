use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use crate::{config::AppConfig, flatten::BookmarkNodes, search::ElasticClient};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub search: ElasticClient,
    // Exportación cargada al arrancar (BOOKMARKS_FILE), si la hay.
    pub bookmarks: Arc<Option<BookmarkNodes>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}
