use serenity::{
    all::Http,
    builder::CreateMessage,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use crate::{
    audio::player::{AdvanceReport, AudioPlayer, PlayerEvent},
    ui::embeds,
};

/// Consume los eventos de fin de stream y avanza la cola de cada servidor.
///
/// Cada evento se procesa en su propia tarea para que una resolución lenta
/// en un servidor no retrase a los demás.
pub async fn run_playback_driver(
    mut events: UnboundedReceiver<PlayerEvent>,
    player: Arc<AudioPlayer>,
    http: Arc<Http>,
) {
    info!("🎛️ Driver de reproducción iniciado");

    while let Some(event) = events.recv().await {
        let player = Arc::clone(&player);
        let http = Arc::clone(&http);

        tokio::spawn(async move {
            let PlayerEvent::StreamEnded {
                guild_id,
                generation,
                error,
            } = event;

            let Some(report) = player.handle_stream_end(guild_id, generation, error).await else {
                return;
            };
            if let Some(channel_id) = player.announce_channel(guild_id) {
                announce(&http, guild_id, channel_id, &report).await;
            }
        });
    }

    info!("🛑 Driver de reproducción detenido");
}

/// Publica en el canal de anuncios lo que empezó a sonar y lo que falló.
pub(crate) async fn announce(http: &Http, guild_id: GuildId, channel_id: ChannelId, report: &AdvanceReport) {
    for (item, err) in &report.failures {
        let embed = embeds::create_error_embed(
            "Error de Reproducción",
            &format!("**{}**\n{}", item, err),
        );
        if let Err(e) = channel_id
            .send_message(http, CreateMessage::new().embed(embed))
            .await
        {
            error!("Error al anunciar fallo en guild {}: {:?}", guild_id, e);
        }
    }

    if let Some(now) = &report.started {
        let embed = embeds::create_now_playing_embed(now);
        if let Err(e) = channel_id
            .send_message(http, CreateMessage::new().embed(embed))
            .await
        {
            error!("Error al enviar mensaje now playing: {:?}", e);
        }
    }
}
