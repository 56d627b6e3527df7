use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{
        controller::EnqueueOutcome,
        session::PlaybackStatus,
        track::{format_duration, Track},
    },
    error::BridgeError,
    runtime::ControlReply,
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

/// Títulos de embed con color y pie de página estándar
pub fn create_generic_embed(
    title: impl Into<String>,
    description: impl Into<String>,
    color: Colour,
    footer: &str,
) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(color)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Límite de Discord para el título de un embed.
const TITLE_LIMIT: usize = 256;
/// Margen bajo el límite de 4096 de la descripción.
const DESCRIPTION_LIMIT: usize = 4000;

/// Corta `text` a `max` caracteres, terminando en "…" si sobraba.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Embed de una canción con duración y miniatura
fn create_song_embed(track: &Track, description: String, color: Colour, footer: &str) -> CreateEmbed {
    let duration = track
        .duration()
        .map_or_else(|| "🔴 En vivo".to_string(), format_duration);

    let title = truncate_chars(&format!("🎵 {}", track.title()), TITLE_LIMIT);
    let mut embed =
        create_generic_embed(title, description, color, footer).field("⏱️ Duración", duration, true);

    // Búsquedas por texto: se muestra qué se pidió.
    if !track.source_query().starts_with("http") {
        embed = embed.field("🔎 Búsqueda", truncate_chars(track.source_query(), 1024), true);
    }

    if track.resolved_url().starts_with("http") {
        embed = embed.url(track.resolved_url());
    }
    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }
    embed
}

pub fn create_now_playing_embed(track: &Track, footer: &str) -> CreateEmbed {
    create_song_embed(
        track,
        "**Reproduciendo ahora.**".to_string(),
        colors::SUCCESS_GREEN,
        footer,
    )
}

pub fn create_track_added_embed(track: &Track, position: usize, footer: &str) -> CreateEmbed {
    create_song_embed(
        track,
        format!("**Agregada a la cola** (posición #{})", position),
        colors::INFO_BLUE,
        footer,
    )
}

pub fn create_queue_embed(titles: &[String], footer: &str) -> CreateEmbed {
    if titles.is_empty() {
        return create_generic_embed(
            "📋 Cola de Reproducción",
            "😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música",
            colors::NEUTRAL_GRAY,
            footer,
        );
    }

    let description = titles
        .iter()
        .enumerate()
        .map(|(i, title)| format!("**{}**. {}", i + 1, title))
        .collect::<Vec<_>>()
        .join("\n");

    let description = truncate_chars(&description, DESCRIPTION_LIMIT);
    create_generic_embed("📋 Cola de Reproducción", description, colors::INFO_BLUE, footer)
        .field("Total", format!("{} canciones", titles.len()), true)
}

pub fn create_status_embed(status: PlaybackStatus, footer: &str) -> CreateEmbed {
    let (emoji, color) = match status {
        PlaybackStatus::Playing => ("▶️", colors::SUCCESS_GREEN),
        PlaybackStatus::Paused => ("⏸️", colors::WARNING_ORANGE),
        PlaybackStatus::Stopped => ("⏹️", colors::NEUTRAL_GRAY),
    };
    create_generic_embed(format!("{} Estado", emoji), format!("**{}**", status), color, footer)
}

/// Naranja para avisos (el comando pudo haberse ejecutado), rojo para errores.
pub fn create_error_embed(error: &BridgeError, footer: &str) -> CreateEmbed {
    if error.is_warning() {
        create_generic_embed("⚠️ Aviso", error.to_string(), colors::WARNING_ORANGE, footer)
    } else {
        create_generic_embed("❌ Error", error.to_string(), colors::ERROR_RED, footer)
    }
}

/// Renders the reply of any player command.
pub fn create_reply_embed(reply: &ControlReply, footer: &str) -> CreateEmbed {
    match reply {
        ControlReply::Enqueued(EnqueueOutcome::NowPlaying(track)) => {
            create_now_playing_embed(track, footer)
        }
        ControlReply::Enqueued(EnqueueOutcome::Queued { track, position }) => {
            create_track_added_embed(track, *position, footer)
        }
        ControlReply::Enqueued(EnqueueOutcome::Connecting(track)) => create_song_embed(
            track,
            "🔌 **Conectando al canal de voz…**".to_string(),
            colors::MUSIC_PURPLE,
            footer,
        ),
        ControlReply::Skipped(track) => create_generic_embed(
            "⏭️ Saltada",
            format!("Se saltó **{}**", track.title()),
            colors::SUCCESS_GREEN,
            footer,
        ),
        ControlReply::Paused => create_generic_embed(
            "⏸️ Pausado",
            "Reproducción pausada",
            colors::SUCCESS_GREEN,
            footer,
        ),
        ControlReply::Resumed => create_generic_embed(
            "▶️ Reanudado",
            "Reproducción reanudada",
            colors::SUCCESS_GREEN,
            footer,
        ),
        ControlReply::Stopped { cleared } => create_generic_embed(
            "⏹️ Detenido",
            format!("Reproducción detenida y cola limpiada ({} canciones)", cleared),
            colors::SUCCESS_GREEN,
            footer,
        ),
        ControlReply::Status(status) => create_status_embed(*status, footer),
        ControlReply::Queue(titles) => create_queue_embed(titles, footer),
        ControlReply::NowPlaying(Some(track)) => create_now_playing_embed(track, footer),
        ControlReply::NowPlaying(None) => create_generic_embed(
            "🎵 Reproduciendo Ahora",
            "No hay ninguna canción reproduciéndose",
            colors::MUSIC_PURPLE,
            footer,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InvalidTransition, PlayerError};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;

    fn json(embed: &CreateEmbed) -> Value {
        serde_json::to_value(embed).unwrap()
    }

    #[test]
    fn test_song_embed_fields() {
        let track = Track::new("q", "https://www.youtube.com/watch?v=a", "Canción")
            .with_duration_seconds(125)
            .with_thumbnail("https://i.ytimg.com/a.jpg");

        let value = json(&create_now_playing_embed(&track, "pie"));

        assert_eq!(value["title"], "🎵 Canción");
        assert_eq!(value["fields"][0]["value"], "2:05");
        assert_eq!(value["fields"][1]["name"], "🔎 Búsqueda");
        assert_eq!(value["fields"][1]["value"], "q");
        assert_eq!(value["thumbnail"]["url"], "https://i.ytimg.com/a.jpg");
        assert_eq!(value["footer"]["text"], "pie");
        assert_eq!(value["color"], colors::SUCCESS_GREEN.0);
    }

    #[test]
    fn test_long_title_is_cut_to_discord_limit() {
        let title = "ñ".repeat(300);
        let track = Track::new("https://www.youtube.com/watch?v=a", "https://www.youtube.com/watch?v=a", title);

        let value = json(&create_track_added_embed(&track, 1, "pie"));
        let shown = value["title"].as_str().unwrap();

        assert_eq!(shown.chars().count(), TITLE_LIMIT);
        assert!(shown.starts_with("🎵 ñ"));
        assert!(shown.ends_with('…'));
        // URL directa: sin campo de búsqueda.
        assert_eq!(value["fields"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate_chars("hola", 4), "hola");
        assert_eq!(truncate_chars("hola!", 4), "hol…");
    }

    #[test]
    fn test_error_colours() {
        let warning = BridgeError::Timeout(Duration::from_secs(5));
        let failure = BridgeError::Failed(PlayerError::Transition(InvalidTransition::NotPlaying));

        assert_eq!(json(&create_error_embed(&warning, "f"))["color"], colors::WARNING_ORANGE.0);
        assert_eq!(json(&create_error_embed(&failure, "f"))["color"], colors::ERROR_RED.0);
        assert_eq!(
            json(&create_error_embed(&failure, "f"))["description"],
            "No hay ninguna canción reproduciéndose"
        );
    }

    #[test]
    fn test_queue_embed_numbering() {
        let value = json(&create_queue_embed(&["a".to_string(), "b".to_string()], "f"));
        assert_eq!(value["description"], "**1**. a\n**2**. b");

        let empty = json(&create_queue_embed(&[], "f"));
        assert_eq!(empty["color"], colors::NEUTRAL_GRAY.0);
    }
}
