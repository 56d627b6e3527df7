//! Error types for the player core.
//!
//! Every error here is recovered at the boundary of the operation that raised
//! it and handed back to the control surface as a typed value. The `Display`
//! text is what the surfaces show to users.

use std::time::Duration;
use thiserror::Error;

/// Problems with what the user asked for. No state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserInputError {
    #[error("Debes estar en un canal de voz para usar este comando")]
    NotInVoiceChannel,

    #[error("La búsqueda está vacía")]
    EmptyQuery,

    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },
}

/// Track lookup failures, kept apart from generic failures so the surface can
/// give an actionable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No se encontraron resultados para: {query}")]
    NotFound { query: String },

    /// DRM-protected or region-locked media.
    #[error("Contenido restringido: {reason}")]
    Restricted { reason: String },

    #[error("La búsqueda falló: {reason}")]
    Failed { reason: String },

    #[error("La búsqueda tardó más de {}", humantime::format_duration(*.0))]
    TimedOut(Duration),
}

/// An operation requested in a state that forbids it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTransition {
    #[error("No hay ninguna canción reproduciéndose")]
    NotPlaying,

    #[error("La reproducción no está en pausa")]
    NotPaused,

    #[error("No estoy conectado a ningún canal de voz")]
    NotConnected,
}

/// Failures reported by the voice transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Error al conectar al canal de voz: {0}")]
    Connect(String),

    #[error("Error de reproducción: {0}")]
    Playback(String),

    #[error("Error al desconectar del canal de voz: {0}")]
    Disconnect(String),
}

/// Anything a player operation can fail with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error(transparent)]
    Input(#[from] UserInputError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The runtime stopped accepting work (shutdown in progress).
    #[error("El reproductor no está disponible")]
    RuntimeUnavailable,

    /// The operation was dropped before it produced a result.
    #[error("La operación se interrumpió antes de terminar")]
    OperationAborted,
}

/// Outcome of a bridge submission that did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The caller stopped waiting. The operation may still complete.
    #[error("El reproductor no respondió en {}; el comando puede completarse igualmente", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error(transparent)]
    Failed(#[from] PlayerError),
}

impl BridgeError {
    /// Warnings rather than hard failures: the command may still have run.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout(_) | BridgeError::Failed(PlayerError::OperationAborted)
        )
    }
}

impl From<ResolutionError> for BridgeError {
    fn from(error: ResolutionError) -> Self {
        BridgeError::Failed(error.into())
    }
}

impl From<UserInputError> for BridgeError {
    fn from(error: UserInputError) -> Self {
        BridgeError::Failed(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_errors_stay_distinct_through_bridge() {
        let err: BridgeError = ResolutionError::Restricted {
            reason: "DRM".to_string(),
        }
        .into();

        assert!(matches!(
            err,
            BridgeError::Failed(PlayerError::Resolution(ResolutionError::Restricted { .. }))
        ));
        assert!(!err.is_warning());
    }

    #[test]
    fn test_timeout_is_warning() {
        let err = BridgeError::Timeout(Duration::from_millis(1500));
        assert!(err.is_warning());
        assert!(err.to_string().contains("1s 500ms"));
    }

    #[test]
    fn test_transition_message_is_transparent() {
        let err = PlayerError::from(InvalidTransition::NotPaused);
        assert_eq!(err.to_string(), "La reproducción no está en pausa");
    }
}
