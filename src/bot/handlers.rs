use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    bot::MusicBot,
    error::{BridgeError, UserInputError},
    runtime::{ControlCommand, ControlReply},
    ui::{buttons, embeds},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let control = match command.data.name.as_str() {
        "play" => return handle_play(ctx, &command, bot, guild_id).await,
        "pause" => ControlCommand::Pause(guild_id),
        "resume" => ControlCommand::Resume(guild_id),
        "skip" => ControlCommand::Skip(guild_id),
        "stop" => ControlCommand::Stop(guild_id),
        "queue" => ControlCommand::ListQueue(guild_id),
        "nowplaying" => ControlCommand::NowPlaying(guild_id),
        "status" => ControlCommand::Status(guild_id),
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }
    };

    // Discord espera respuesta en 3 segundos; el reproductor puede tardar más.
    command.create_response(&ctx.http, command_ack()).await?;

    let result = bot.player().execute_async(control).await;
    command
        .edit_response(&ctx.http, reply_edit(&result, bot.footer()))
        .await?;

    Ok(())
}

/// Maneja los botones del reproductor
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(control) = buttons::command_for(&component.data.custom_id, guild_id) else {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Acción no reconocida")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    component.create_response(&ctx.http, component_ack()).await?;

    // El panel se actualiza en su lugar; los errores van en un mensaje aparte.
    match bot.player().execute_async(control).await {
        Ok(reply) => {
            component
                .edit_response(&ctx.http, reply_edit(&Ok(reply), bot.footer()))
                .await?;
        }
        Err(e) => {
            component
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new()
                        .embed(embeds::create_error_embed(&e, bot.footer()))
                        .ephemeral(true),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default()
        .to_string();

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        let error: BridgeError = UserInputError::NotInVoiceChannel.into();
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .embed(embeds::create_error_embed(&error, bot.footer()))
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    // Defer la respuesta ya que la búsqueda puede tomar tiempo
    command.create_response(&ctx.http, command_ack()).await?;

    let result = bot
        .player()
        .enqueue_async(guild_id, Some(voice_channel_id), &query)
        .await;
    command
        .edit_response(&ctx.http, reply_edit(&result, bot.footer()))
        .await?;

    Ok(())
}

// Funciones auxiliares

/// Respuesta diferida a un comando; el resultado llega luego con `edit_response`.
fn command_ack() -> CreateInteractionResponse {
    CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true))
}

/// Confirma el botón sin tocar todavía el mensaje del panel.
fn component_ack() -> CreateInteractionResponse {
    CreateInteractionResponse::Acknowledge
}

/// Contenido final de una respuesta ya confirmada.
fn reply_edit(result: &Result<ControlReply, BridgeError>, footer: &str) -> EditInteractionResponse {
    match result {
        Ok(reply) => {
            let controls = buttons::controls_for(reply)
                .map(buttons::create_player_controls)
                .unwrap_or_default();
            EditInteractionResponse::new()
                .embed(embeds::create_reply_embed(reply, footer))
                .components(controls)
        }
        Err(e) => EditInteractionResponse::new().embed(embeds::create_error_embed(e, footer)),
    }
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
