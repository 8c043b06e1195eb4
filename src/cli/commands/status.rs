use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat, VectorBackend};
use crate::services::{HttpEmbeddingClient, MetricsStore, create_backend};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let (embedding_reachable, served_model) = match HttpEmbeddingClient::new(&config.embedding) {
        Ok(client) => match client.health_check().await {
            Ok(health) => (true, health.model_id),
            Err(_) => (false, None),
        },
        Err(_) => (false, None),
    };

    let (store_connected, chunk_count) = match create_backend(&config.vector_store).await {
        Ok(store) => {
            let connected = store.health_check().await.unwrap_or(false);
            let chunks = if connected {
                store.count_chunks().await.unwrap_or(0)
            } else {
                0
            };
            (connected, chunks)
        }
        Err(_) => (false, 0),
    };

    let operations = if config.metrics.enabled {
        MetricsStore::open_default()
            .map(|store| store.summaries(config.metrics.retention_days))
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    // The Postgres connection string may carry credentials via the
    // environment; only the config file value is shown.
    let store_location = match config.vector_store.backend {
        VectorBackend::Qdrant => config.vector_store.url.clone(),
        VectorBackend::Postgres => config.vector_store.postgres_url.clone(),
    };

    let status = StatusInfo {
        embedding_url: config.embedding.url.clone(),
        embedding_model: config.embedding.model.clone(),
        embedding_reachable,
        served_model,
        store_backend: config.vector_store.backend.to_string(),
        store_location,
        store_connected,
        collection: config.vector_store.collection.clone(),
        chunk_count,
        operations,
    };

    print!("{}", formatter.format_status(&status));

    if !embedding_reachable || !store_connected {
        eprintln!();
        if !embedding_reachable {
            eprintln!(
                "Warning: embedding server unreachable at {}. Searches will return no results.",
                config.embedding.url
            );
        }
        if !store_connected {
            match config.vector_store.backend {
                VectorBackend::Qdrant => {
                    eprintln!(
                        "Warning: Qdrant not running. Start with: docker compose up -d qdrant"
                    );
                }
                VectorBackend::Postgres => {
                    eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
                }
            }
        }
    }

    Ok(())
}
