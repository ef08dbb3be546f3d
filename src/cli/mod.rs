pub mod app;
pub mod check_acl;
pub mod commands;
pub mod context;
pub mod env;
pub mod print_config;
pub mod runtime;
pub mod serve;

pub use check_acl::{cmd_check_acl, CheckAclArgs};
pub use print_config::cmd_print_config;
pub use serve::{cmd_serve, ServeArgs};
