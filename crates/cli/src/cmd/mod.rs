mod apply;
mod build;
mod clean;
mod deploy;
mod fetch;
mod generate_smbios;
mod list;
mod read_config;
mod status;
mod validate;

pub use apply::cmd_apply;
pub use build::cmd_build;
pub use clean::cmd_clean;
pub use deploy::cmd_deploy;
pub use fetch::cmd_fetch;
pub use generate_smbios::cmd_generate_smbios;
pub use list::cmd_list;
pub use read_config::cmd_read_config;
pub use status::cmd_status;
pub use validate::cmd_validate;
