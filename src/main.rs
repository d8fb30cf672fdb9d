use anyhow::Result;
use log::error;
use rocket::fs::FileServer;
use std::thread;
use tokio::sync::broadcast;

use pixpress::api::handlers::generate_compress_routes;
use pixpress::background;
use pixpress::bootstrap::setup::{initialize_folder, initialize_logger};
use pixpress::common::{BACKGROUND_RUNTIME, SERVER_RUNTIME};
use pixpress::config::APP_CONFIG;

fn build_rocket() -> rocket::Rocket<rocket::Build> {
    let figment = rocket::Config::figment().merge(("shutdown.ctrlc", false));

    rocket::custom(figment)
        .mount(
            APP_CONFIG.download_base.as_str(),
            FileServer::from(&APP_CONFIG.storage_root),
        )
        .mount("/", generate_compress_routes())
}

fn main() -> Result<()> {
    initialize_logger();
    initialize_folder()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let worker_handle = thread::spawn({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            BACKGROUND_RUNTIME.block_on(async {
                let worker = tokio::spawn(background::run(shutdown_tx.subscribe()));

                let mut shutdown_rx = shutdown_tx.subscribe();
                let is_ctrl_c = tokio::select! {
                    _ = tokio::signal::ctrl_c() => true,
                    _ = shutdown_rx.recv() => false,
                };

                if is_ctrl_c {
                    let _ = shutdown_tx.send(());
                }
                let _ = worker.await;
            });
        }
    });

    let rocket_handle = thread::spawn({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            let result = SERVER_RUNTIME.block_on(async {
                let rocket_instance = build_rocket().ignite().await?;
                let shutdown_handle = rocket_instance.shutdown();
                let shutdown_tx_clone = shutdown_tx.clone();
                SERVER_RUNTIME.spawn(async move {
                    let mut shutdown_rx = shutdown_tx_clone.subscribe();
                    if shutdown_rx.recv().await.is_ok() {
                        shutdown_handle.notify();
                    }
                });
                rocket_instance.launch().await
            });
            if let Err(e) = result {
                error!("Rocket server failed: {}", e);
                let _ = shutdown_tx.send(());
                return Err(anyhow::Error::from(e));
            }
            Ok(())
        }
    });

    worker_handle.join().expect("Worker thread panicked");
    let _ = rocket_handle.join().expect("Rocket thread panicked");

    Ok(())
}
