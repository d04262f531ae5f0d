pub mod playback_commands;
