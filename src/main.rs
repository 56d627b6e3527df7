use anyhow::{Context as _, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod console;
mod error;
mod runtime;
mod sources;
mod ui;

use crate::audio::songbird_transport::SongbirdTransport;
use crate::bot::MusicBot;
use crate::config::Config;
use crate::console::Console;
use crate::runtime::{BackgroundTasks, GatewayShutdown, PlayerClient, PlayerRuntime, ShutdownCoordinator};
use crate::sources::{ResolverPool, YtDlpResolver};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let debug = std::env::var("DEBUG")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(false);
    init_logging(debug)?;

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Pool de búsqueda, separado del runtime principal
    let resolver_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.resolver_workers)
        .thread_name("resolver")
        .enable_all()
        .build()
        .context("No se pudo crear el pool de búsqueda")?;

    // Runtime principal: red, voz y estado del reproductor en un solo hilo
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("No se pudo iniciar el runtime principal")?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return runtime.block_on(health_check(&config));
    }

    let shutdown = CancellationToken::new();
    let result = runtime.block_on(run(config.clone(), resolver_runtime.handle().clone(), shutdown));

    runtime.shutdown_timeout(config.force_stop_timeout);
    resolver_runtime.shutdown_timeout(config.force_stop_timeout);

    result?;
    info!("👋 Bot detenido");
    Ok(())
}

fn init_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("guild_jukebox={}", level).parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    Ok(())
}

async fn run(config: Arc<Config>, resolver_workers: Handle, shutdown: CancellationToken) -> Result<()> {
    let tasks = BackgroundTasks::new();

    // Voz y runtime del reproductor
    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(
        songbird.clone(),
        reqwest::Client::new(),
        config.default_volume,
        config.ytdlp_path.clone(),
    ));
    let (player_runtime, bridge) =
        PlayerRuntime::new(transport, config.max_queue_size, shutdown.clone());
    let events = player_runtime.event_sender();
    tasks.spawn("player", player_runtime.run());

    let resolver = ResolverPool::new(
        Arc::new(YtDlpResolver::new(config.ytdlp_path.clone())),
        resolver_workers,
        config.max_concurrent_resolutions,
        config.resolve_timeout,
    );
    let client = PlayerClient::new(bridge, resolver, config.bridge_timeout);

    if config.enable_console {
        let console = Console::new(client.clone(), shutdown.clone());
        std::thread::Builder::new()
            .name("console".to_string())
            .spawn(move || console.run_blocking())
            .context("No se pudo iniciar la consola")?;
    }

    // Cliente de Discord
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = MusicBot::new(config.clone(), client, events, tasks.clone(), shutdown.clone());
    let mut discord = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .context("Error al crear el cliente de Discord")?;
    let shard_manager = discord.shard_manager.clone();

    let gateway_shutdown = shutdown.clone();
    tasks.spawn_fallible("gateway", async move {
        info!("🚀 Conectando al gateway de Discord");
        let result = discord.start().await;
        if let Err(why) = &result {
            error!("Error al ejecutar cliente: {:?}", why);
        }
        // Sin gateway no hay bot: se apaga todo.
        gateway_shutdown.cancel();
        result.context("El gateway de Discord se detuvo con error")
    });

    // Manejar shutdown graceful
    let signal_shutdown = shutdown.clone();
    tasks.spawn("ctrl-c", async move {
        tokio::select! {
            _ = signal_shutdown.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("⚠️ Señal de shutdown recibida, cerrando...");
                    signal_shutdown.cancel();
                }
                Err(e) => {
                    error!("Error al registrar Ctrl+C: {}", e);
                    signal_shutdown.cancelled().await;
                }
            },
        }
    });

    shutdown.cancelled().await;

    ShutdownCoordinator::new(config.shutdown_grace, config.shutdown_task_timeout, tasks)
        .run(&GatewayShutdown(shard_manager))
        .await
        .into_result()
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
