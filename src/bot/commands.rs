use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::CommandOptionType,
        channel::ChannelType,
        id::GuildId,
        Permissions,
    },
    prelude::Context,
};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        ping_command(),
        help_command(),
        setup_command(),
        join_command(),
        leave_command(),
        play_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        skip_command(),
        volume_command(),
        queue_command(),
        setvoicechannel_command(),
        removevoicechannel_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos generales

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Muestra la latencia del bot")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra información de ayuda")
}

fn setup_command() -> CreateCommand {
    CreateCommand::new("setup")
        .description("Configura el reenvío de mensajes")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "source", "Canal de origen")
                .channel_types(vec![ChannelType::Text])
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Channel,
                "target",
                "Canal de destino (vacío = repetir en el mismo canal)",
            )
            .channel_types(vec![ChannelType::Text]),
        )
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce música de Spotify o busca en YouTube")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Enlace de Spotify/YouTube o término de búsqueda",
            )
            .required(true)
            .set_autocomplete(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Consulta o ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-100)",
            )
            .min_int_value(0)
            .max_int_value(100),
        )
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

// Canales temporales

fn setvoicechannel_command() -> CreateCommand {
    CreateCommand::new("setvoicechannel")
        .description("Define el canal de voz que crea canales temporales")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Channel,
                "channel",
                "Canal de voz (vacío = tu canal actual)",
            )
            .channel_types(vec![ChannelType::Voice]),
        )
}

fn removevoicechannel_command() -> CreateCommand {
    CreateCommand::new("removevoicechannel")
        .description("Quita el canal de voz que crea canales temporales")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
}
