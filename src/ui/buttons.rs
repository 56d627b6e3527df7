use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
    model::id::GuildId,
};

use crate::{
    audio::{controller::EnqueueOutcome, session::PlaybackStatus},
    runtime::{ControlCommand, ControlReply},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "player_pause";
    pub const RESUME: &str = "player_resume";
    pub const SKIP: &str = "player_skip";
    pub const STOP: &str = "player_stop";
}

/// Controles del reproductor bajo los mensajes de "reproduciendo ahora".
pub fn create_player_controls(status: PlaybackStatus) -> Vec<CreateActionRow> {
    let toggle = match status {
        PlaybackStatus::Paused => CreateButton::new(button_ids::RESUME)
            .emoji('▶')
            .style(ButtonStyle::Primary),
        PlaybackStatus::Playing | PlaybackStatus::Stopped => CreateButton::new(button_ids::PAUSE)
            .emoji('⏸')
            .style(ButtonStyle::Primary),
    };

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![toggle, skip_btn, stop_btn])]
}

/// Comando que dispara un botón, si es uno de los nuestros.
pub fn command_for(custom_id: &str, guild_id: GuildId) -> Option<ControlCommand> {
    let command = match custom_id {
        button_ids::PAUSE => ControlCommand::Pause(guild_id),
        button_ids::RESUME => ControlCommand::Resume(guild_id),
        button_ids::SKIP => ControlCommand::Skip(guild_id),
        button_ids::STOP => ControlCommand::Stop(guild_id),
        _ => return None,
    };
    Some(command)
}

/// Estado con el que mostrar los controles tras una respuesta, o `None` si no
/// van controles.
pub fn controls_for(reply: &ControlReply) -> Option<PlaybackStatus> {
    match reply {
        ControlReply::Enqueued(EnqueueOutcome::NowPlaying(_))
        | ControlReply::NowPlaying(Some(_))
        | ControlReply::Resumed => Some(PlaybackStatus::Playing),
        ControlReply::Paused => Some(PlaybackStatus::Paused),
        ControlReply::Status(status @ (PlaybackStatus::Playing | PlaybackStatus::Paused)) => {
            Some(*status)
        }
        _ => None,
    }
}
