use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, select, task::JoinSet};
use tracing::{debug, error, info, warn};

use super::{
    banner::{describe_queues, print_banner, print_startup_log},
    connection::{ConnectionConfig, ConnectionManager},
};
use crate::{news::NewsService, Settings};

/// Поднимает сервер по настройкам и обслуживает клиентов, пока не
/// завершится `shutdown`.
pub async fn run<F>(
    settings: &Settings,
    service: NewsService,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(&settings.listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen_address))?;
    let local_addr = listener.local_addr().context("Failed to read local address")?;

    print_banner(
        &local_addr.to_string(),
        &describe_queues(&service.broker().config()),
    );
    print_startup_log();

    serve(listener, settings.connection_config(), service, shutdown).await
}

/// Цикл приёма соединений на готовом `listener`.
///
/// После `shutdown` новые соединения не принимаются, открытым отправляется
/// `bye`, и сервер ждёт их закрытия не дольше `shutdown_timeout`.
pub async fn serve<F>(
    listener: TcpListener,
    config: ConnectionConfig,
    service: NewsService,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let shutdown_timeout = config.shutdown_timeout;
    let manager = Arc::new(ConnectionManager::new(config));
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    info!(
        listen = %listener.local_addr().context("Failed to read local address")?,
        max_connections = manager.config().max_connections,
        "Server listening"
    );

    loop {
        select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }

            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        // Ошибки accept (например, EMFILE) не останавливают сервер
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };
                spawn_connection(&mut connections, &manager, socket, addr, service.clone());
            }

            // Собираем завершившиеся задачи, чтобы JoinSet не рос
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "Connection task panicked");
                    }
                }
            }
        }
    }

    drop(listener);
    manager.shutdown();

    if let Err(e) = manager.wait_for_shutdown(shutdown_timeout).await {
        warn!(error = %e, remaining = manager.active_connections(), "Aborting remaining connections");
        connections.abort_all();
    }
    while connections.join_next().await.is_some() {}

    info!("Server stopped");
    Ok(())
}

fn spawn_connection(
    connections: &mut JoinSet<()>,
    manager: &Arc<ConnectionManager>,
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    service: NewsService,
) {
    if let Err(e) = socket.set_nodelay(true) {
        debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
    }

    let manager = Arc::clone(manager);
    connections.spawn(async move {
        // Ошибки уже залогированы менеджером
        let _ = manager.handle_connection(socket, addr, service).await;
    });
}
