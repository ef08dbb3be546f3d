use clap::Subcommand;

use super::check_acl::CheckAclArgs;
use super::serve::ServeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Serve the document API over HTTP
    Serve(ServeArgs),

    /// Compile an ACL file and report its rules without serving
    CheckAcl(CheckAclArgs),

    /// Print the effective configuration (file plus environment overrides)
    PrintConfig,
}
