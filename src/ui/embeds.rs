use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{
    player::{NowPlaying, PlaybackSnapshot, PlaybackState},
    queue::QueueItem,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Relay Tune";

/// Elementos de la cola que se listan en `/queue`
pub const QUEUE_PREVIEW: usize = 10;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &NowPlaying) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN);

    if let Some(link) = &track.catalog_url {
        embed = embed
            .field("🔗 Spotify", link, false)
            .url(link);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción a la cola
pub fn create_track_queued_embed(item: &QueueItem, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Agregado a la Cola")
        .description(format!("**{}**", item))
        .color(colors::MUSIC_PURPLE)
        .field("📍 Posición", position.to_string(), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá cuando termine lo que está sonando",
        ))
}

pub fn create_queue_embed(snapshot: &PlaybackSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &snapshot.current_title {
        let status = match snapshot.state {
            PlaybackState::Paused => "⏸️ En pausa",
            _ => "▶️ Reproduciendo",
        };
        embed = embed.field(status, format!("**{}**", current), false);
    }

    if snapshot.queue_len == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    embed
        .field("Próximas canciones", queue_lines(&snapshot.queue), false)
        .field(
            "Información",
            format!("**Total:** {} canciones", snapshot.queue_len),
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

fn queue_lines(items: &[QueueItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("**{}**. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Relay Tune - Guía de Comandos")
        .color(colors::INFO_BLUE)
        .description("Reenvío de mensajes, música y canales de voz temporales")
        .field(
            "🔄 Reenvío",
            "• `/setup <origen> [destino]` - Configura el reenvío de mensajes\n\
            • `/ping` - Muestra la latencia",
            false,
        )
        .field(
            "🎵 Reproducción",
            "• `/play <canción>` - Reproduce o agrega a la cola (acepta enlaces de Spotify)\n\
            • `/pause` - Pausa la reproducción\n\
            • `/resume` - Reanuda la reproducción\n\
            • `/skip` - Salta la canción actual\n\
            • `/stop` - Detiene y limpia la cola\n\
            • `/queue` - Muestra la cola\n\
            • `/volume [nivel]` - Consulta o ajusta el volumen (0-100)",
            false,
        )
        .field(
            "🔊 Conexión",
            "• `/join` - Conecta al canal de voz\n\
            • `/leave` - Desconecta del canal",
            false,
        )
        .field(
            "🏠 Canales Temporales",
            "• `/setvoicechannel [canal]` - Define el canal hub\n\
            • `/removevoicechannel` - Quita el canal hub",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(volume: u8, playing: bool) -> CreateEmbed {
    let status_emoji = match volume {
        0 => "🔈",
        1..=50 => "🔉",
        _ => "🔊",
    };

    let description = if playing {
        format!("**Volumen actual: {}%**", volume)
    } else {
        format!("**Volumen por defecto: {}%** (no hay nada sonando)", volume)
    };

    CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(description)
        .field("📊 Nivel", create_volume_bar(volume), false)
        .color(if playing {
            colors::INFO_BLUE
        } else {
            colors::WARNING_ORANGE
        })
        .footer(CreateEmbedFooter::new("💡 Usa /volume <0-100> para ajustar"))
        .timestamp(Timestamp::now())
}

/// Crea una barra visual de volumen (escala 0-100)
fn create_volume_bar(volume: u8) -> String {
    let segments = 20;
    let filled = (usize::from(volume.min(100)) * segments) / 100;
    let bar = "█".repeat(filled) + &"▒".repeat(segments - filled);
    format!("`[{}]`", bar)
}
