use anyhow::{Context, Result};
use axum::Router;
use bookmarks_es_webapp::{api, app_state::AppState, config, flatten, search};
use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Cliente de Elasticsearch
    let search = search::ElasticClient::from_config(&cfg)
        .context("Error inicializando el cliente de Elasticsearch")?;
    info!(
        "Consultas contra {} (índice '{}').",
        cfg.elasticsearch_base_url,
        search.index()
    );

    // 4. Aplanar la exportación indicada en BOOKMARKS_FILE, si existe
    let bookmarks = match &cfg.bookmarks_file {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("No se pudo abrir {}", path.display()))?;
            let nodes = flatten::BookmarkNodes::from_reader(BufReader::new(file), &cfg.path_separator)
                .with_context(|| format!("Error aplanando {}", path.display()))?;
            info!("{} marcadores cargados desde {}.", nodes.node_count(), path.display());
            Some(nodes)
        }
        None => None,
    };

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        search,
        bookmarks: Arc::new(bookmarks),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    // Abrir el frontend en el navegador por defecto
    if app_state.config.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("El servidor terminó con error")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
