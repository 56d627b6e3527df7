//! Discord presentation: embeds for command replies and the player buttons.

pub mod buttons;
pub mod embeds;
