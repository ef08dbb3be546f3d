use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Args;
use docgate_acl::loader::compile_acl_file;
use docgate_acl::{AclRegistry, PredicateParser};
use serde_json::json;

#[derive(Args, Clone, Debug)]
pub struct CheckAclArgs {
    /// ACL file (YAML or JSON)
    pub file: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_check_acl(args: CheckAclArgs) -> Result<()> {
    let registry = compile_acl_file(&args.file, Arc::new(PredicateParser::new()))
        .map_err(|err| anyhow!("{}: {}", args.file.display(), err.0.summary()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&registry))?);
        return Ok(());
    }

    println!("{}: {} rule(s)", args.file.display(), registry.len());
    for role in sorted_roles(&registry) {
        println!("  {role}:");
        for rule in registry.allow_rules_for(&role) {
            println!("    [{}] {}", rule.priority, rule.source);
        }
    }
    let veto = registry.veto_rules();
    if !veto.is_empty() {
        println!("  veto:");
        for rule in veto {
            println!("    [{}] {}", rule.priority, rule.source);
        }
    }
    Ok(())
}

fn sorted_roles(registry: &AclRegistry) -> Vec<String> {
    let mut roles: Vec<String> = registry.roles().map(str::to_string).collect();
    roles.sort();
    roles
}

fn summary_json(registry: &AclRegistry) -> serde_json::Value {
    let roles: serde_json::Map<String, serde_json::Value> = sorted_roles(registry)
        .into_iter()
        .map(|role| {
            let count = registry.allow_rules_for(&role).len();
            (role, json!(count))
        })
        .collect();
    json!({
        "rules": registry.len(),
        "roles": roles,
        "veto": registry.veto_rules().len(),
    })
}
