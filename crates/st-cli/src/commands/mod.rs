//! CLI command implementations

mod connect;
mod doctor;
mod profiles;
mod ssh_config;
mod status;

pub use connect::{check_network, connect_command};
pub use doctor::doctor_command;
pub use profiles::{
    add_command, copy_command, default_editor, edit_command, list_command, remove_command,
    rename_command, show_command,
};
pub use ssh_config::ssh_config_command;
pub use status::status_command;
